use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use async_trait::async_trait;
use v_event_relay::domain::record::decode;
use v_event_relay::error::ResolveError;
use v_event_relay::membership::MembershipResolver;
use v_event_relay::registry::ConnectionRegistry;
use v_event_relay::storage::{MemoryStore, MessageStore};
use v_event_relay::{EventMessage, Router};

struct Members(Vec<i64>);

#[async_trait]
impl MembershipResolver for Members {
    async fn events_for_user(&self, _user_id: i64) -> Result<Vec<i64>, ResolveError> {
        Ok(Vec::new())
    }
    async fn users_for_event(&self, _event_id: i64) -> Result<Vec<i64>, ResolveError> {
        Ok(self.0.clone())
    }
}

fn benchmark_decode(c: &mut Criterion) {
    let single = br#"{"eventId":42,"receiverId":7}"#;
    let multiple = br#"{"eventId":42,"userIds":[1,2,3,4,5,6,7,8,9,10,3,0]}"#;

    c.bench_function("decode_event_user_added", |b| {
        b.iter(|| decode(black_box("event-user-added"), black_box(single)))
    });

    c.bench_function("decode_and_split_image_user_attached", |b| {
        let payload = std::str::from_utf8(multiple).unwrap_or_default();
        b.iter(|| {
            let record = decode("image-user-attached", black_box(multiple)).unwrap();
            record.into_dispatches("image-user-attached", payload)
        })
    });
}

fn benchmark_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    for member_count in [10i64, 100, 1000].iter() {
        let members: Vec<i64> = (1..=*member_count).collect();
        let registry = Arc::new(ConnectionRegistry::new(1024));
        // 一半成员在线 / Half the members online
        let mut inboxes = Vec::new();
        for id in members.iter().filter(|id| *id % 2 == 0) {
            let (_reg, rx) = registry.register(*id, "127.0.0.1:1".parse().unwrap());
            inboxes.push(rx);
        }
        let store = Arc::new(MemoryStore::new());
        let router = Router::new(
            registry,
            store.clone(),
            Arc::new(Members(members)),
            Duration::from_millis(10),
        );

        c.bench_function(&format!("fan_out_{}_members", member_count), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let message = EventMessage {
                        channel: "message".into(),
                        event_id: 1,
                        sender_id: 1,
                        body: serde_json::json!("bench"),
                        ..Default::default()
                    };
                    router.route(black_box(message)).await.unwrap();
                    for rx in inboxes.iter_mut() {
                        while rx.try_recv().is_ok() {}
                    }
                })
            })
        });
        println!("stored {} offline copies", store.len().unwrap_or(0));
    }
}

criterion_group!(benches, benchmark_decode, benchmark_fan_out);
criterion_main!(benches);
