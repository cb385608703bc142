use super::*;
use crate::clock::{ManualClock, SharedClock};
use crate::room::{Entity, EntityKind};
use std::sync::Arc;

fn village_zones() -> Vec<Zone> {
    vec![
        Zone::new("lobby", 192.0, 48.0, 384.0, 144.0),
        Zone::new("office", 592.0, 48.0, 352.0, 224.0),
        Zone::new("plaza", 1216.0, 1216.0, 512.0, 512.0),
    ]
}

fn test_log() -> EventLog {
    let clock: SharedClock = Arc::new(ManualClock::new(1_000));
    EventLog::new(60_000, 1000, clock)
}

#[test]
fn test_detect_zone_inside_and_outside() {
    let system = ZoneSystem::new(village_zones()).unwrap();
    assert_eq!(system.detect_zone(1472.0, 1472.0), Some("plaza".to_string()));
    // Right edge is exclusive
    assert_eq!(system.detect_zone(1728.0, 1472.0), None);
    // Left edge is inclusive
    assert_eq!(system.detect_zone(1216.0, 1216.0), Some("plaza".to_string()));
    assert_eq!(system.detect_zone(0.0, 0.0), None);
}

#[test]
fn test_shared_edges_do_not_overlap() {
    let zones = vec![
        Zone::new("west", 0.0, 0.0, 100.0, 100.0),
        Zone::new("east", 100.0, 0.0, 100.0, 100.0),
    ];
    let system = ZoneSystem::new(zones).unwrap();
    assert_eq!(system.detect_zone(99.9, 50.0), Some("west".to_string()));
    assert_eq!(system.detect_zone(100.0, 50.0), Some("east".to_string()));
}

#[test]
fn test_overlapping_zones_rejected() {
    let zones = vec![
        Zone::new("a", 0.0, 0.0, 100.0, 100.0),
        Zone::new("b", 50.0, 50.0, 100.0, 100.0),
    ];
    assert_eq!(
        ZoneSystem::new(zones).err(),
        Some(ZoneError::Overlap {
            first: "a".to_string(),
            second: "b".to_string()
        })
    );
}

#[test]
fn test_invalid_zone_configs_rejected() {
    assert_eq!(
        ZoneSystem::new(vec![Zone::new("a", 0.0, 0.0, 0.0, 10.0)]).err(),
        Some(ZoneError::EmptyBounds("a".to_string()))
    );
    assert_eq!(
        ZoneSystem::new(vec![
            Zone::new("a", 0.0, 0.0, 10.0, 10.0),
            Zone::new("a", 20.0, 0.0, 10.0, 10.0),
        ])
        .err(),
        Some(ZoneError::DuplicateId("a".to_string()))
    );
    assert_eq!(
        ZoneSystem::new(vec![Zone::new("", 0.0, 0.0, 10.0, 10.0)]).err(),
        Some(ZoneError::EmptyId)
    );
}

#[test]
fn test_update_without_side_effects() {
    let mut system = ZoneSystem::new(village_zones()).unwrap();

    let update = system.update_entity_zone("agent_1", 300.0, 100.0, None, None);
    assert_eq!(update.current_zone, Some("lobby".to_string()));
    assert_eq!(update.previous_zone, None);
    assert!(update.changed);

    let update = system.update_entity_zone("agent_1", 310.0, 110.0, None, None);
    assert!(!update.changed);

    let update = system.update_entity_zone("agent_1", 700.0, 100.0, None, None);
    assert_eq!(update.previous_zone, Some("lobby".to_string()));
    assert_eq!(update.current_zone, Some("office".to_string()));
    assert!(update.changed);
}

#[test]
fn test_transition_emits_exit_then_enter() {
    let mut system = ZoneSystem::new(village_zones()).unwrap();
    let mut log = test_log();

    system.update_entity_zone("agent_1", 300.0, 100.0, Some((&mut log, "r1")), None);
    system.update_entity_zone("agent_1", 700.0, 100.0, Some((&mut log, "r1")), None);

    let batch = log.get_since("", 10);
    let types: Vec<EventType> = batch.events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![EventType::ZoneEnter, EventType::ZoneExit, EventType::ZoneEnter]
    );
    assert_eq!(batch.events[1].payload["zoneId"], "lobby");
    assert_eq!(batch.events[1].payload["nextZoneId"], "office");
    assert_eq!(batch.events[2].payload["previousZoneId"], "lobby");
    assert_eq!(batch.events[2].room_id, "r1");
}

#[test]
fn test_leaving_all_zones_emits_only_exit() {
    let mut system = ZoneSystem::new(village_zones()).unwrap();
    let mut log = test_log();

    system.update_entity_zone("agent_1", 300.0, 100.0, Some((&mut log, "r1")), None);
    let update = system.update_entity_zone("agent_1", 5.0, 5.0, Some((&mut log, "r1")), None);
    assert_eq!(update.current_zone, None);
    assert!(update.changed);

    let batch = log.get_since("", 10);
    assert_eq!(batch.events.len(), 2);
    assert_eq!(batch.events[1].event_type, EventType::ZoneExit);
    assert!(batch.events[1].payload["nextZoneId"].is_null());
}

#[test]
fn test_update_writes_entity_zone() {
    let mut system = ZoneSystem::new(village_zones()).unwrap();
    let mut entity = Entity::new("agent_1", "Ada", EntityKind::Agent, 300.0, 100.0);

    system.update_entity_zone("agent_1", 300.0, 100.0, None, Some(&mut entity));
    assert_eq!(entity.current_zone, Some("lobby".to_string()));
}

#[test]
fn test_population_queries() {
    let mut system = ZoneSystem::new(village_zones()).unwrap();
    system.update_entity_zone("b", 300.0, 100.0, None, None);
    system.update_entity_zone("a", 310.0, 100.0, None, None);
    system.update_entity_zone("c", 700.0, 100.0, None, None);
    system.update_entity_zone("d", 5.0, 5.0, None, None);

    assert_eq!(system.get_entities_in_zone("lobby"), vec!["a", "b"]);
    assert_eq!(system.get_zone_population("lobby"), 2);
    assert_eq!(system.get_zone_population("office"), 1);
    assert_eq!(system.get_zone_population("plaza"), 0);
    assert_eq!(system.tracked_count(), 4);
    assert_eq!(
        system.populations(),
        vec![
            ("lobby".to_string(), 2),
            ("office".to_string(), 1),
            ("plaza".to_string(), 0)
        ]
    );
}

#[test]
fn test_remove_entity_emits_exit() {
    let mut system = ZoneSystem::new(village_zones()).unwrap();
    let mut log = test_log();
    system.update_entity_zone("a", 300.0, 100.0, None, None);

    let previous = system.remove_entity("a", Some((&mut log, "r1")));
    assert_eq!(previous, Some("lobby".to_string()));
    assert_eq!(system.get_zone_population("lobby"), 0);
    assert_eq!(system.get_entity_zone("a"), None);
    assert_eq!(log.get_size(), 1);

    // Unknown entity: nothing to emit
    assert_eq!(system.remove_entity("ghost", Some((&mut log, "r1"))), None);
    assert_eq!(log.get_size(), 1);
}

#[test]
fn test_single_membership_for_every_point() {
    let system = ZoneSystem::new(village_zones()).unwrap();
    let mut y = 0.0;
    while y < 1800.0 {
        let mut x = 0.0;
        while x < 1800.0 {
            let hits = system
                .zones()
                .iter()
                .filter(|z| z.bounds.contains(x, y))
                .count();
            assert!(hits <= 1);
            assert_eq!(system.detect_zone(x, y).is_some(), hits == 1);
            x += 16.0;
        }
        y += 16.0;
    }
}
