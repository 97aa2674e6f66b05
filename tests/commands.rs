//! Command surface tests through the service.

use parking_lot::Mutex;
use std::sync::Arc;
use wiki_subscriptions::{
    CommandArgs, CommandResponse, Config, EphemeralPoster, MemoryKvStore, Post, PostError,
    ResponseType, Subscription, SubscriptionService,
};

/// Captures ephemeral posts instead of delivering them.
#[derive(Default)]
struct RecordingPoster {
    posts: Mutex<Vec<(String, Post)>>,
    fail: bool,
}

impl RecordingPoster {
    fn messages(&self) -> Vec<String> {
        self.posts.lock().iter().map(|(_, p)| p.message.clone()).collect()
    }

    fn last(&self) -> (String, Post) {
        self.posts.lock().last().cloned().expect("no post")
    }
}

impl EphemeralPoster for RecordingPoster {
    fn send_ephemeral(&self, user_id: &str, post: Post) -> Result<(), PostError> {
        if self.fail {
            return Err(PostError("platform unavailable".into()));
        }
        self.posts.lock().push((user_id.to_string(), post));
        Ok(())
    }
}

fn config() -> Config {
    Config {
        bot_user_id: "bot-user".into(),
        ..Default::default()
    }
}

fn service() -> (Arc<MemoryKvStore>, Arc<RecordingPoster>, SubscriptionService) {
    let store = Arc::new(MemoryKvStore::new());
    let poster = Arc::new(RecordingPoster::default());
    let service = SubscriptionService::with_store(config(), store.clone(), poster.clone()).unwrap();
    (store, poster, service)
}

fn run(service: &SubscriptionService, command: &str) -> CommandResponse {
    service.execute_command(&CommandArgs::new("U1", "C1", command))
}

#[test]
fn test_list_without_subscriptions() {
    let (_store, poster, service) = service();

    let response = run(&service, "/confluence list");
    assert_eq!(response, CommandResponse::empty());

    let (user_id, post) = poster.last();
    assert_eq!(user_id, "U1");
    assert_eq!(post.user_id, "bot-user");
    assert_eq!(post.channel_id, "C1");
    assert_eq!(post.message, "No subscription found for this channel.");
}

#[test]
fn test_list_renders_table() {
    let (_store, poster, service) = service();
    service
        .manager()
        .create_subscription(Subscription::new(
            "a1",
            "C1",
            "https://wiki.example.com",
            "ENG",
            ["page_created", "page_updated"],
        ))
        .unwrap();

    run(&service, "/confluence list");

    let (_, post) = poster.last();
    assert_eq!(
        post.message,
        "| Alias | Base Url | Space Key | Events|\n| :----: |:--------:| :--------:| :-----:|\n|a1|https://wiki.example.com|ENG|page_created, page_updated|"
    );
}

#[test]
fn test_list_storage_error() {
    let (store, poster, service) = service();
    store.fail_reads_for("C1");

    run(&service, "/confluence list");
    assert_eq!(
        poster.messages(),
        vec!["Encountered an error getting channel subscriptions."]
    );
}

#[test]
fn test_delete_messages() {
    let (store, poster, service) = service();
    service
        .manager()
        .create_subscription(Subscription::new("a1", "C1", "https://w", "ENG", ["page_created"]))
        .unwrap();

    run(&service, "/confluence delete missing");
    run(&service, "/confluence delete a1");
    assert!(service.manager().list_subscriptions("C1").unwrap().is_empty());

    service
        .manager()
        .create_subscription(Subscription::new("a2", "C1", "https://w", "ENG", ["page_created"]))
        .unwrap();
    store.fail_writes_for("C1");
    run(&service, "/confluence delete a2");

    assert_eq!(
        poster.messages(),
        vec![
            "Subscription with alias **missing** not found.",
            "Subscription with alias **a1** deleted successfully.",
            "Error occured while deleting subscription with alias **a2**.",
        ]
    );
}

#[test]
fn test_delete_without_alias() {
    let (store, poster, service) = service();

    run(&service, "/confluence delete");
    assert_eq!(
        poster.messages(),
        vec!["Please specify the alias of the subscription to delete."]
    );
    assert_eq!(store.read_count(), 0);
}

#[test]
fn test_invalid_commands() {
    let (_store, poster, service) = service();

    for command in ["/confluence", "/confluence subscribe", "/confluence lists", "/confluence x list"] {
        let response = run(&service, command);
        assert_eq!(response.response_type, ResponseType::Ephemeral);
        assert_eq!(response.text, "Invalid command");
    }
    assert!(poster.messages().is_empty());
}

#[test]
fn test_extra_tokens_after_list_are_ignored() {
    let (_store, poster, service) = service();
    run(&service, "/confluence   list   everything");
    assert_eq!(poster.messages(), vec!["No subscription found for this channel."]);
}

#[test]
fn test_commands_are_scoped_to_invoking_channel() {
    let (_store, poster, service) = service();
    service
        .manager()
        .create_subscription(Subscription::new("a1", "C2", "https://w", "ENG", ["page_created"]))
        .unwrap();

    run(&service, "/confluence delete a1");
    assert_eq!(poster.messages(), vec!["Subscription with alias **a1** not found."]);
    assert_eq!(service.manager().list_subscriptions("C2").unwrap().len(), 1);
}

#[test]
fn test_failed_post_does_not_fail_command() {
    let store = Arc::new(MemoryKvStore::new());
    let poster = Arc::new(RecordingPoster {
        fail: true,
        ..Default::default()
    });
    let service = SubscriptionService::with_store(config(), store, poster.clone()).unwrap();

    let response = run(&service, "/confluence list");
    assert_eq!(response, CommandResponse::empty());
    assert!(poster.messages().is_empty());
}

#[test]
fn test_command_descriptor() {
    let (_store, _poster, service) = service();
    let descriptor = service.command();
    assert_eq!(descriptor.trigger, "confluence");
    assert_eq!(descriptor.display_name, "Confluence");
    assert!(descriptor.auto_complete);
    assert_eq!(descriptor.auto_complete_hint, "[command]");
}

#[test]
fn test_service_requires_bot_user() {
    let result = SubscriptionService::open(
        Config::default(),
        Arc::new(RecordingPoster::default()),
    );
    assert!(result.is_err());
}

#[test]
fn test_command_descriptor_uses_configured_trigger() {
    let store = Arc::new(MemoryKvStore::new());
    let poster = Arc::new(RecordingPoster::default());
    let service = SubscriptionService::with_store(
        Config {
            trigger: "wiki".into(),
            ..config()
        },
        store,
        poster,
    )
    .unwrap();

    let descriptor = service.command();
    assert_eq!(descriptor.trigger, "wiki");
    assert_eq!(descriptor.display_name, "Confluence");
    assert!(descriptor.auto_complete);
    assert_eq!(descriptor.auto_complete_hint, "[command]");
}
