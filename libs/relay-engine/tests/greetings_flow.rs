use std::sync::Arc;

use relay_engine::{Broker, EngineConfig, ErrorKind, TopicPartition};

fn greetings() -> Vec<String> {
    vec!["greetings".to_string()]
}

#[test]
fn publish_poll_commit_round() {
    let broker = Broker::default();
    broker.create_topic("greetings", 1).unwrap();
    let publisher = broker.publisher();

    let alice = publisher.publish("greetings", None, "Hello Alice").unwrap();
    let bob = publisher.publish("greetings", None, "Hello Bob").unwrap();
    assert_eq!((alice.partition, alice.offset), (0, 0));
    assert_eq!((bob.partition, bob.offset), (0, 1));

    let consumer = broker
        .subscribe("messenger-group", "messenger-0", &greetings())
        .unwrap();
    let batch = consumer.poll(10).unwrap();
    let values: Vec<&str> = batch.iter().map(|r| r.record.value.as_str()).collect();
    assert_eq!(values, vec!["Hello Alice", "Hello Bob"]);
    assert!(batch.iter().all(|r| r.topic == "greetings" && r.partition == 0));

    let tp = TopicPartition::new("greetings", 0);
    consumer.commit(&tp, 2).unwrap();
    assert!(consumer.poll(10).unwrap().is_empty());

    let err = consumer.commit(&tp, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = consumer.commit(&tp, 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn restarted_member_resumes_from_committed_offset() {
    let broker = Broker::default();
    broker.create_topic("greetings", 1).unwrap();
    let publisher = broker.publisher();
    publisher.publish("greetings", None, "Hello Alice").unwrap();

    let consumer = broker
        .subscribe("messenger-group", "messenger-0", &greetings())
        .unwrap();
    let batch = consumer.poll(10).unwrap();
    consumer.commit_consumed(&batch).unwrap();
    consumer.leave().unwrap();

    publisher.publish("greetings", None, "Hello Bob").unwrap();
    let consumer = broker
        .subscribe("messenger-group", "messenger-0", &greetings())
        .unwrap();
    let batch = consumer.poll(10).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].record.value, "Hello Bob");
    assert_eq!(batch[0].record.offset, 1);
}

#[test]
fn groups_track_offsets_independently() {
    let broker = Broker::default();
    broker.create_topic("greetings", 1).unwrap();
    broker.publisher().publish("greetings", None, "Hello").unwrap();

    let first = broker.subscribe("g1", "m", &greetings()).unwrap();
    let second = broker.subscribe("g2", "m", &greetings()).unwrap();

    let batch = first.poll(10).unwrap();
    first.commit_consumed(&batch).unwrap();
    assert!(first.poll(10).unwrap().is_empty());
    assert_eq!(second.poll(10).unwrap().len(), 1);
}

#[test]
fn disabled_auto_create_rejects_unknown_topic() {
    let broker = Broker::new(EngineConfig {
        auto_create_topics: false,
        default_partitions: 1,
    });
    let err = broker
        .publisher()
        .publish("greetings", None, "Hello")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn concurrent_publishers_and_consumers_see_every_record_once() {
    let broker = Arc::new(Broker::default());
    broker.create_topic("greetings", 4).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|t| {
            let publisher = broker.publisher();
            std::thread::spawn(move || {
                for i in 0..100 {
                    publisher
                        .publish("greetings", None, format!("{t}-{i}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let consumers: Vec<_> = (0..2)
        .map(|m| {
            broker
                .subscribe("g", &format!("m{m}"), &greetings())
                .unwrap()
        })
        .collect();

    let mut seen = Vec::new();
    for consumer in &consumers {
        loop {
            let batch = consumer.poll(32).unwrap();
            if batch.is_empty() {
                break;
            }
            consumer.commit_consumed(&batch).unwrap();
            seen.extend(batch.into_iter().map(|r| r.record.value));
        }
    }
    seen.sort();
    let mut expected: Vec<String> = (0..4)
        .flat_map(|t| (0..100).map(move |i| format!("{t}-{i}")))
        .collect();
    expected.sort();
    assert_eq!(seen, expected);
}
