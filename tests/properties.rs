//! End-to-end conversion behavior through the public engine surface.

use std::rc::Rc;

use moonbridge::{
    Category, ConversionStatus, Engine, FieldSpec, HostKey, HostValue, NumWidth, ScriptValue,
    TableKey, TypeDescriptor,
};

fn person_type() -> std::sync::Arc<TypeDescriptor> {
    TypeDescriptor::record(
        "Person",
        vec![
            FieldSpec::renamed("Name", "nm", TypeDescriptor::primitive(Category::Text)),
            FieldSpec::new("Age", TypeDescriptor::primitive(Category::Signed)),
        ],
    )
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn scalars_round_trip_exactly() {
    let mut engine = Engine::new();
    let cases = vec![
        (HostValue::Bool(true), TypeDescriptor::primitive(Category::Bool)),
        (HostValue::Int(-42), TypeDescriptor::primitive(Category::Signed)),
        (HostValue::Uint(42), TypeDescriptor::primitive(Category::Unsigned)),
        (HostValue::Float(2.5), TypeDescriptor::primitive(Category::Float)),
        (HostValue::str("hello"), TypeDescriptor::primitive(Category::Text)),
    ];
    for (value, target) in cases {
        let script = engine.to_foreign(&value, false);
        let back = engine.from_foreign(&script, &target).unwrap();
        assert!(
            back.value.host_eq(&value),
            "round trip changed {value:?} into {:?}",
            back.value
        );
        assert_eq!(back.status, ConversionStatus::Complete);
    }
}

#[test]
fn sequences_round_trip_through_copies() {
    let mut engine = Engine::new();
    let original = HostValue::seq(vec![
        HostValue::Int(1),
        HostValue::Int(2),
        HostValue::Int(3),
    ]);
    let script = engine.to_foreign(&original, false);
    assert!(matches!(script, ScriptValue::Table(_)));

    let target = TypeDescriptor::seq(TypeDescriptor::primitive(Category::Signed));
    let back = engine.from_foreign(&script, &target).unwrap();
    let HostValue::Seq(items) = &back.value else {
        panic!("expected a sequence, got {:?}", back.value);
    };
    let items = items.borrow();
    assert_eq!(items.len(), 3);
    for (i, item) in items.iter().enumerate() {
        assert!(item.host_eq(&HostValue::Int((i + 1) as i64)));
    }
}

#[test]
fn records_round_trip_with_renames() {
    let mut engine = Engine::new();
    let person = person_type();
    let record = moonbridge::Record::new(
        person.clone(),
        vec![HostValue::str("Dolly"), HostValue::Int(46)],
    )
    .into_ref();

    // Copy out: the table is keyed by the script-facing names.
    let script = engine.to_foreign(&HostValue::Record(record), false);
    let ScriptValue::Table(table) = &script else {
        panic!("expected a table copy");
    };
    assert!(table
        .borrow()
        .get(&TableKey::str("nm"))
        .same_value(&ScriptValue::str("Dolly")));
    assert!(table.borrow().get(&TableKey::str("Name")).is_nil());

    // And back in.
    let back = engine.from_foreign(&script, &person).unwrap();
    let HostValue::Record(r) = &back.value else {
        panic!("expected a record");
    };
    assert!(r.borrow().get(0).unwrap().host_eq(&HostValue::str("Dolly")));
    assert!(r.borrow().get(1).unwrap().host_eq(&HostValue::Int(46)));
}

// ============================================================================
// Null positions
// ============================================================================

#[test]
fn absent_elements_keep_their_positions() {
    let mut engine = Engine::new();
    let original = HostValue::seq(vec![HostValue::Int(1), HostValue::Nil, HostValue::Int(3)]);
    let script = engine.to_foreign(&original, false);
    let ScriptValue::Table(table) = &script else {
        panic!("expected a table copy");
    };

    // The middle position holds the null marker, not nil, so the
    // sequence border stays at 3.
    assert_eq!(table.borrow().seq_len(), 3);
    let middle = table.borrow().get(&TableKey::number(2.0));
    assert!(engine.is_null_marker(&middle));

    // Converting the marker back yields the target's zero value.
    let target = TypeDescriptor::seq(TypeDescriptor::primitive(Category::Signed));
    let back = engine.from_foreign(&script, &target).unwrap();
    let HostValue::Seq(items) = &back.value else {
        panic!("expected a sequence");
    };
    assert!(items.borrow()[1].host_eq(&HostValue::Int(0)));
    assert_eq!(back.status, ConversionStatus::Complete);
}

// ============================================================================
// Cycles and sharing
// ============================================================================

#[test]
fn self_referential_sequence_copies_into_a_cyclic_table() {
    let mut engine = Engine::new();
    let seq = Rc::new(std::cell::RefCell::new(vec![HostValue::Int(0)]));
    let value = HostValue::Seq(seq.clone());
    seq.borrow_mut()[0] = value.clone();

    let script = engine.to_foreign(&value, false);
    let ScriptValue::Table(table) = &script else {
        panic!("expected a table copy");
    };
    let inner = table.borrow().get(&TableKey::number(1.0));
    let ScriptValue::Table(inner) = inner else {
        panic!("expected the cycle to close through a table");
    };
    assert!(Rc::ptr_eq(table, &inner));

    // And back again: the cyclic table converts into a host sequence
    // whose first element is the sequence itself.
    let target = TypeDescriptor::seq(TypeDescriptor::any());
    let back = engine.from_foreign(&script, &target).unwrap();
    let HostValue::Seq(items) = &back.value else {
        panic!("expected a sequence, got {:?}", back.value);
    };
    let first = items.borrow()[0].clone();
    let HostValue::Seq(first) = first else {
        panic!("expected the cycle to close through a sequence");
    };
    assert!(Rc::ptr_eq(items, &first));
    assert_eq!(back.status, ConversionStatus::Complete);
}

#[test]
fn shared_substructure_converts_once() {
    let mut engine = Engine::new();
    let shared = HostValue::seq(vec![HostValue::Int(9)]);
    let outer = HostValue::seq(vec![shared.clone(), shared.clone()]);
    let script = engine.to_foreign(&outer, false);
    let ScriptValue::Table(table) = &script else {
        panic!("expected a table copy");
    };
    let (a, b) = (
        table.borrow().get(&TableKey::number(1.0)),
        table.borrow().get(&TableKey::number(2.0)),
    );
    let (ScriptValue::Table(a), ScriptValue::Table(b)) = (a, b) else {
        panic!("expected nested tables");
    };
    assert!(Rc::ptr_eq(&a, &b));
}

// ============================================================================
// Proxies vs copies
// ============================================================================

#[test]
fn writes_through_a_proxy_reach_host_memory() {
    let mut engine = Engine::new();
    let seq = HostValue::seq(vec![HostValue::Int(1), HostValue::Int(2)]);
    let script = engine.to_foreign(&seq, true);
    let ScriptValue::Foreign(id) = script else {
        panic!("expected a handle");
    };

    engine
        .index_set(id, &ScriptValue::Number(1.0), &ScriptValue::Number(10.0))
        .unwrap();

    let HostValue::Seq(items) = &seq else {
        unreachable!()
    };
    assert!(items.borrow()[0].host_eq(&HostValue::Int(10)));
}

#[test]
fn mutating_a_copy_leaves_the_host_alone() {
    let mut engine = Engine::new();
    let seq = HostValue::seq(vec![HostValue::Int(1), HostValue::Int(2)]);
    let script = engine.to_foreign(&seq, false);
    let ScriptValue::Table(table) = &script else {
        panic!("expected a table copy");
    };
    table
        .borrow_mut()
        .set(TableKey::number(1.0), ScriptValue::Number(99.0));

    let HostValue::Seq(items) = &seq else {
        unreachable!()
    };
    assert!(items.borrow()[0].host_eq(&HostValue::Int(1)));
}

#[test]
fn unproxify_detaches_a_handle_into_a_copy() {
    let mut engine = Engine::new();
    let seq = HostValue::seq(vec![HostValue::Int(5)]);
    let proxy = engine.to_foreign(&seq, true);
    let copy = engine.unproxify(&proxy);
    let ScriptValue::Table(table) = &copy else {
        panic!("expected a table copy");
    };
    table
        .borrow_mut()
        .set(TableKey::number(1.0), ScriptValue::Number(0.0));
    let HostValue::Seq(items) = &seq else {
        unreachable!()
    };
    assert!(items.borrow()[0].host_eq(&HostValue::Int(5)));
}

// ============================================================================
// Records through tables
// ============================================================================

#[test]
fn table_with_only_unmatched_keys_yields_the_zero_record() {
    let mut engine = Engine::new();
    let table = moonbridge::new_table();
    table
        .borrow_mut()
        .set(TableKey::str("unrelated"), ScriptValue::Number(1.0));
    let back = engine
        .from_foreign(&ScriptValue::Table(table), &person_type())
        .unwrap();
    // Unknown keys are ignored, not errors.
    assert_eq!(back.status, ConversionStatus::Complete);
    let HostValue::Record(r) = &back.value else {
        panic!("expected a record");
    };
    assert!(r.borrow().get(0).unwrap().host_eq(&HostValue::str("")));
    assert!(r.borrow().get(1).unwrap().host_eq(&HostValue::Int(0)));
}

#[test]
fn record_field_access_honors_the_rename_through_a_proxy() {
    let mut engine = Engine::new();
    let record = moonbridge::Record::new(
        person_type(),
        vec![HostValue::str("Dolly"), HostValue::Int(46)],
    )
    .into_ref();
    let value = HostValue::reference(HostValue::Record(record.clone()));
    let script = engine.to_foreign(&value, true);
    let ScriptValue::Foreign(id) = script else {
        panic!("expected a handle");
    };

    let name = engine.index_get(id, &ScriptValue::str("nm")).unwrap();
    assert!(name.same_value(&ScriptValue::str("Dolly")));
    assert!(engine.index_get(id, &ScriptValue::str("Name")).is_err());

    engine
        .index_set(id, &ScriptValue::str("Age"), &ScriptValue::Number(47.0))
        .unwrap();
    assert!(record.borrow().get(1).unwrap().host_eq(&HostValue::Int(47)));

    // Writing an undeclared field is rejected.
    assert!(engine
        .index_set(id, &ScriptValue::str("bogus"), &ScriptValue::Number(0.0))
        .is_err());
}

// ============================================================================
// Partial conversions
// ============================================================================

#[test]
fn one_bad_element_degrades_to_a_partial_result() {
    let mut engine = Engine::new();
    let table = moonbridge::new_table();
    table
        .borrow_mut()
        .set(TableKey::number(1.0), ScriptValue::Number(1.0));
    table
        .borrow_mut()
        .set(TableKey::number(2.0), ScriptValue::str("not a number"));
    table
        .borrow_mut()
        .set(TableKey::number(3.0), ScriptValue::Number(3.0));

    let target = TypeDescriptor::seq(TypeDescriptor::primitive(Category::Signed));
    let back = engine
        .from_foreign(&ScriptValue::Table(table), &target)
        .unwrap();

    let HostValue::Seq(items) = &back.value else {
        panic!("expected a sequence");
    };
    let items = items.borrow();
    assert!(items[0].host_eq(&HostValue::Int(1)));
    assert!(items[1].host_eq(&HostValue::Int(0)));
    assert!(items[2].host_eq(&HostValue::Int(3)));

    let ConversionStatus::Partial(issues) = &back.status else {
        panic!("expected a partial status");
    };
    assert_eq!(issues.len(), 1);
}

#[test]
fn declared_widths_bound_the_narrowing() {
    let mut engine = Engine::new();
    let byte = TypeDescriptor::named_scalar_width("Byte", Category::Unsigned, NumWidth::W8);
    let ok = engine.from_foreign(&ScriptValue::Number(200.0), &byte).unwrap();
    assert!(ok.value.host_eq(&HostValue::Uint(200)));
    assert!(engine.from_foreign(&ScriptValue::Number(300.0), &byte).is_err());

    let short = TypeDescriptor::named_scalar_width("Short", Category::Signed, NumWidth::W16);
    assert!(engine
        .from_foreign(&ScriptValue::Number(-32768.0), &short)
        .is_ok());
    assert!(engine
        .from_foreign(&ScriptValue::Number(-32769.0), &short)
        .is_err());
}

#[test]
fn fractional_numbers_do_not_narrow_to_integers() {
    let mut engine = Engine::new();
    let target = TypeDescriptor::primitive(Category::Signed);
    assert!(engine
        .from_foreign(&ScriptValue::Number(1.5), &target)
        .is_err());
    assert!(engine
        .from_foreign(&ScriptValue::Number(-3.0), &target)
        .is_ok());
    let unsigned = TypeDescriptor::primitive(Category::Unsigned);
    assert!(engine
        .from_foreign(&ScriptValue::Number(-1.0), &unsigned)
        .is_err());
}

// ============================================================================
// Open-target inference
// ============================================================================

#[test]
fn open_targets_infer_sequence_or_mapping() {
    let mut engine = Engine::new();

    let seq_table = moonbridge::new_table();
    for i in 1..=2 {
        seq_table
            .borrow_mut()
            .set(TableKey::number(i as f64), ScriptValue::Number(i as f64));
    }
    let back = engine
        .from_foreign(&ScriptValue::Table(seq_table), &TypeDescriptor::any())
        .unwrap();
    assert!(matches!(back.value, HostValue::Seq(_)));

    let map_table = moonbridge::new_table();
    map_table
        .borrow_mut()
        .set(TableKey::str("k"), ScriptValue::Number(1.0));
    map_table
        .borrow_mut()
        .set(TableKey::number(1.0), ScriptValue::Number(2.0));
    let back = engine
        .from_foreign(&ScriptValue::Table(map_table), &TypeDescriptor::any())
        .unwrap();
    let HostValue::Map(entries) = &back.value else {
        panic!("expected a mapping, got {:?}", back.value);
    };
    assert_eq!(entries.borrow().len(), 2);
    assert!(entries
        .borrow()
        .get(&HostKey::Str("k".into()))
        .unwrap()
        .host_eq(&HostValue::Float(1.0)));

    // The empty table has no sequence evidence; it becomes a mapping.
    let back = engine
        .from_foreign(
            &ScriptValue::Table(moonbridge::new_table()),
            &TypeDescriptor::any(),
        )
        .unwrap();
    assert!(matches!(back.value, HostValue::Map(_)));
}
