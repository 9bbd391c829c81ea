// Event-trace properties: scope pairing, declare/update/move ordering.

use std::collections::HashSet;

use ivy_cli::events::{EventValue, MemEvent};

fn run_events(src: &str) -> Vec<MemEvent> {
    let p = ivy_parse::parse_str(src).expect("parse ok");
    let ds = ivy_types::analyze(&p);
    assert!(
        ds.is_empty(),
        "diagnostics: {:?}",
        ds.iter().map(|d| d.to_string()).collect::<Vec<_>>()
    );
    let mut events = Vec::new();
    let mut out = |_l: String| {};
    ivy_cli::eval::run(&p, &mut out, &mut |e| events.push(e)).expect("run ok");
    events
}

#[test]
fn every_entered_scope_is_exited() {
    let src = concat!(
        "fn main():\n",
        "    let mut i: int = 0\n",
        "    while i < 2:\n",
        "        i = i + 1\n",
        "    for x in range(2):\n",
        "        print(x)\n",
    );
    let events = run_events(src);

    let mut entered: Vec<u64> = Vec::new();
    let mut exited: Vec<u64> = Vec::new();
    for e in &events {
        match e {
            MemEvent::EnterScope { scope_id, .. } => entered.push(*scope_id),
            MemEvent::ExitScope { scope_id } => exited.push(*scope_id),
            _ => {}
        }
    }
    let entered_set: HashSet<u64> = entered.iter().copied().collect();
    let exited_set: HashSet<u64> = exited.iter().copied().collect();
    assert_eq!(entered_set, exited_set);
    assert_eq!(entered.len(), exited.len());
    // scope ids are never reused
    assert_eq!(entered.len(), entered_set.len());
}

#[test]
fn scope_events_nest_like_a_stack() {
    let src = "fn main():\n    if true:\n        let a = 1\n        print(a)\n";
    let events = run_events(src);

    let mut stack: Vec<u64> = Vec::new();
    for e in &events {
        match e {
            MemEvent::EnterScope {
                scope_id,
                parent_scope_id,
            } => {
                assert_eq!(parent_scope_id.as_ref(), stack.last());
                stack.push(*scope_id);
            }
            MemEvent::ExitScope { scope_id } => {
                assert_eq!(stack.pop(), Some(*scope_id));
            }
            _ => {}
        }
    }
    assert!(stack.is_empty());
}

#[test]
fn declares_updates_and_moves_reference_entered_scopes() {
    let src = concat!(
        "struct U:\n",
        "    name: str\n",
        "fn main():\n",
        "    let mut n: int = 1\n",
        "    n = 2\n",
        "    let a: U = U { name: \"x\" }\n",
        "    let b: U = a\n",
    );
    let events = run_events(src);

    let mut entered: HashSet<u64> = HashSet::new();
    for e in &events {
        match e {
            MemEvent::EnterScope { scope_id, .. } => {
                entered.insert(*scope_id);
            }
            MemEvent::Declare { scope_id, .. }
            | MemEvent::Update { scope_id, .. }
            | MemEvent::Move { scope_id, .. } => {
                assert!(entered.contains(scope_id), "event before scope entry");
            }
            _ => {}
        }
    }
    assert!(entered.contains(&0), "global scope is entered");
}

#[test]
fn non_primitive_reads_emit_move_events() {
    let src = concat!(
        "struct U:\n",
        "    name: str\n",
        "fn main():\n",
        "    let a: U = U { name: \"x\" }\n",
        "    let b: U = a\n",
    );
    let events = run_events(src);

    let declare_a = events.iter().position(|e| {
        matches!(e, MemEvent::Declare { name, .. } if name == "a")
    });
    let move_a = events.iter().position(|e| {
        matches!(e, MemEvent::Move { name, moved: true, .. } if name == "a")
    });
    let declare_b = events.iter().position(|e| {
        matches!(e, MemEvent::Declare { name, .. } if name == "b")
    });
    let (da, ma, db) = (
        declare_a.expect("declare a"),
        move_a.expect("move a"),
        declare_b.expect("declare b"),
    );
    assert!(da < ma && ma < db, "declare a, then move a, then declare b");
}

#[test]
fn primitive_reads_do_not_emit_move_events() {
    let src = "fn main():\n    let n: int = 1\n    let m: int = n\n    print(m)\n";
    let events = run_events(src);
    assert!(
        !events.iter().any(|e| matches!(e, MemEvent::Move { .. })),
        "{:?}",
        events
    );
}

#[test]
fn updates_carry_the_new_value() {
    let src = "fn main():\n    let mut n: int = 1\n    n = 5\n";
    let events = run_events(src);
    let update = events
        .iter()
        .find_map(|e| match e {
            MemEvent::Update { name, value, moved, .. } if name == "n" => {
                Some((value.clone(), *moved))
            }
            _ => None,
        })
        .expect("update event");
    assert_eq!(update, (EventValue::Int(5), false));
}

#[test]
fn for_loop_rebinds_item_in_a_fresh_scope_each_iteration() {
    let src = "fn main():\n    for x in range(2):\n        print(x)\n";
    let events = run_events(src);

    let item_scopes: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            MemEvent::Declare { scope_id, name, .. } if name == "x" => Some(*scope_id),
            _ => None,
        })
        .collect();
    assert_eq!(item_scopes.len(), 2);
    assert_ne!(item_scopes[0], item_scopes[1]);
}

#[test]
fn events_serialize_to_tagged_json() {
    let src = "fn main():\n    let n: int = 1\n";
    let events = run_events(src);
    let json = serde_json::to_string(&events[0]).expect("serialize");
    assert!(json.contains("\"event\":\"ENTER_SCOPE\""), "{}", json);
}
