//! Message bus journeys
//!
//! Broadcast fan-out with the sender self-filter, FIFO consumption with
//! at-most-once delivery, registry lifecycle, and cleanup.

use katra_core::{AgentStatus, BusConfig, KatraConfig};
use katra_e2e_tests::harness::TestEngine;

fn trio() -> TestEngine {
    let t = TestEngine::new();
    t.engine.bus().register("ci-alice", "alice", Some("lead")).unwrap();
    t.engine.bus().register("ci-bob", "bob", None).unwrap();
    t.engine.bus().register("ci-carol", "carol", None).unwrap();
    t
}

#[test]
fn broadcast_reaches_everyone_except_the_sender() {
    let t = trio();
    let bus = t.engine.bus();

    let bob_before = bus.count("bob").unwrap();
    let carol_before = bus.count("carol").unwrap();

    let receipt = bus.say("alice", "hello", Some("broadcast")).unwrap();
    assert_eq!(receipt.delivered, 2);

    assert_eq!(bus.count("bob").unwrap(), bob_before + 1);
    assert_eq!(bus.count("carol").unwrap(), carol_before + 1);
    assert_eq!(bus.count("alice").unwrap(), 0);

    // Every queued row references the broadcast it fanned out from
    let entry = bus.hear("bob").unwrap().message.unwrap();
    assert_eq!(entry.broadcast_message_id, receipt.broadcast_message_id);
    assert_eq!(entry.sender_ci_id, "ci-alice");
    assert_ne!(entry.recipient_ci_id, entry.sender_ci_id);
}

#[test]
fn null_and_empty_recipient_specs_broadcast() {
    let t = trio();
    let bus = t.engine.bus();

    bus.say("alice", "one", None).unwrap();
    bus.say("alice", "two", Some("")).unwrap();
    bus.say("alice", "three", Some("Broadcast")).unwrap();

    assert_eq!(bus.count("bob").unwrap(), 3);
    assert_eq!(bus.count("alice").unwrap(), 0);
    assert_eq!(bus.history(10).unwrap().len(), 3);
}

#[test]
fn hear_pops_fifo_and_count_drops_by_one() {
    let t = trio();
    let bus = t.engine.bus();
    bus.say("alice", "first", Some("bob")).unwrap();
    bus.say("carol", "second", Some("bob")).unwrap();

    let before = bus.count("bob").unwrap();
    let result = bus.hear("bob").unwrap();
    assert_eq!(result.message.as_ref().unwrap().message, "first");
    assert_eq!(bus.count("bob").unwrap(), before - 1);
    assert_eq!(result.more_available, before - 1);

    // At-most-once: the popped row is gone for good
    let result = bus.hear("bob").unwrap();
    assert_eq!(result.message.unwrap().message, "second");
    assert!(bus.hear("bob").unwrap().message.is_none());
}

#[test]
fn hear_on_empty_queue_returns_no_new_messages() {
    let t = trio();
    let result = t.engine.bus().hear("bob").unwrap();
    assert!(result.message.is_none());
    assert_eq!(result.more_available, 0);
}

#[test]
fn hear_all_drains_in_order() {
    let t = trio();
    let bus = t.engine.bus();
    for i in 0..4 {
        bus.say("alice", &format!("m{i}"), Some("bob")).unwrap();
    }

    let (entries, more) = bus.hear_all("bob", Some(10)).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(more, 0);
    let bodies: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(bodies, vec!["m0", "m1", "m2", "m3"]);
}

#[test]
fn direct_send_skips_unknown_dedupes_and_self_filters() {
    let t = trio();
    let bus = t.engine.bus();

    let receipt = bus
        .say("alice", "ping", Some("Bob, bob, alice, mallory, carol"))
        .unwrap();
    assert_eq!(receipt.delivered, 2);
    assert_eq!(receipt.skipped_unknown, vec!["mallory".to_string()]);
    assert_eq!(bus.count("bob").unwrap(), 1);
    assert_eq!(bus.count("carol").unwrap(), 1);
    assert_eq!(bus.count("alice").unwrap(), 0);
}

#[test]
fn status_wire_strings_are_stable() {
    let t = trio();
    let bus = t.engine.bus();

    bus.set_status("ci-alice", AgentStatus::DoNotDisturb).unwrap();
    let status = bus.get_status("ci-alice").unwrap();
    assert_eq!(status, AgentStatus::DoNotDisturb);
    assert_eq!(serde_json::to_string(&status).unwrap(), "\"do_not_disturb\"");

    let health = t.engine.health().unwrap();
    assert_eq!(serde_json::to_string(&health.status).unwrap(), "\"healthy\"");
}

#[test]
fn reregistration_keeps_joined_at_and_heartbeat_moves() {
    let t = trio();
    let bus = t.engine.bus();

    let before = bus
        .registry()
        .unwrap()
        .into_iter()
        .find(|e| e.ci_id == "ci-bob")
        .unwrap();
    bus.register("ci-bob", "bob", Some("reviewer")).unwrap();
    let after = bus
        .registry()
        .unwrap()
        .into_iter()
        .find(|e| e.ci_id == "ci-bob")
        .unwrap();

    assert_eq!(after.joined_at, before.joined_at);
    assert!(after.last_seen >= before.last_seen);
    assert_eq!(after.role.as_deref(), Some("reviewer"));
}

#[test]
fn maintenance_cleans_expired_broadcasts_and_stale_agents() {
    let t = TestEngine::with_config(KatraConfig {
        bus: BusConfig {
            message_ttl_hours: 0,
            stale_timeout_secs: 0,
            ..Default::default()
        },
        ..Default::default()
    });
    let bus = t.engine.bus();
    bus.register("ci-alice", "alice", None).unwrap();
    bus.register("ci-bob", "bob", None).unwrap();
    bus.say("alice", "fleeting", None).unwrap();

    let report = t.engine.run_maintenance();
    assert_eq!(report.errors, 0);
    assert_eq!(report.bus_cleanup.expired_broadcasts, 1);
    assert_eq!(report.bus_cleanup.stale_registrations, 2);
    assert!(bus.registry().unwrap().is_empty());
}

#[test]
fn unregistered_names_are_rejected_for_send_and_receive() {
    let t = TestEngine::new();
    let bus = t.engine.bus();

    assert!(bus.say("ghost", "boo", None).is_err());
    assert!(bus.hear("ghost").is_err());
    assert!(bus.count("ghost").is_err());
}
