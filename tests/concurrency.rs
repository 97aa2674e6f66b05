//! Concurrent commands against one manager.

use std::sync::Arc;
use std::thread;
use wiki_subscriptions::{ManagerOptions, MemoryKvStore, Subscription, SubscriptionManager};

fn serialized_manager() -> Arc<SubscriptionManager> {
    let store = Arc::new(MemoryKvStore::new());
    Arc::new(SubscriptionManager::with_options(
        store,
        &ManagerOptions {
            serialize_same_key: true,
            ..Default::default()
        },
    ))
}

#[test]
fn test_serialized_creates_on_one_channel_are_not_lost() {
    let manager = serialized_manager();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..10 {
                    manager
                        .create_subscription(Subscription::new(
                            format!("t{t}-{i}"),
                            "C1",
                            "https://w",
                            "ENG",
                            ["page_created"],
                        ))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(manager.list_subscriptions("C1").unwrap().len(), 80);
    assert!(manager.check_channel("C1").unwrap().is_empty());
}

#[test]
fn test_serialized_channels_sharing_a_space() {
    let manager = serialized_manager();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let channel = format!("C{t}");
                manager
                    .create_subscription(Subscription::new(
                        "a",
                        channel.as_str(),
                        "https://w",
                        "ENG",
                        ["page_created"],
                    ))
                    .unwrap();
                if t % 2 == 0 {
                    manager.delete_subscription(&channel, "a").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let channels = manager
        .channels_for_event("https://w", "ENG", "page_created")
        .unwrap();
    assert_eq!(channels, vec!["C1", "C3", "C5", "C7"]);
}

#[test]
fn test_unserialized_independent_channels() {
    let store = Arc::new(MemoryKvStore::new());
    let manager = Arc::new(SubscriptionManager::new(store));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let channel = format!("C{t}");
                for i in 0..5 {
                    manager
                        .create_subscription(Subscription::new(
                            format!("a{i}"),
                            channel.as_str(),
                            "https://w",
                            format!("S{t}"),
                            ["page_created"],
                        ))
                        .unwrap();
                }
                manager.delete_subscription(&channel, "a0").unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4 {
        let channel = format!("C{t}");
        assert_eq!(manager.list_subscriptions(&channel).unwrap().len(), 4);
        assert!(manager.check_channel(&channel).unwrap().is_empty());
    }
}
