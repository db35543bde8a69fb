//! End-to-end repairs of small logs

use query_repair::ast::{CompareOp, Condition, Literal, SetExpr, Statement, Value};
use query_repair::engine::replay;
use query_repair::instance::{Attribute, Complaint, Database, RepairProblem, Schema, TupleId};
use query_repair::solver::{Options, Repairer};
use query_repair::RepairError;

fn single_x(rows: &[(u64, f64)]) -> Database {
    let schema = Schema::new("T", vec![Attribute::numeric("x", 0.0, 100.0)]).unwrap();
    let mut db = Database::new(schema);
    for &(id, x) in rows {
        db.insert(TupleId(id), vec![x.into()]).unwrap();
    }
    db
}

fn x_eq(value: f64, repairable: bool) -> Vec<Condition> {
    let literal = if repairable {
        Literal::repairable(value)
    } else {
        Literal::fixed(value)
    };
    vec![Condition::new("x", CompareOp::Eq, literal)]
}

#[test]
fn update_value_is_repaired() {
    let log = vec![Statement::update(
        "T",
        [("x", SetExpr::literal(Literal::repairable(10.0)))],
        x_eq(5.0, false),
    )];
    let problem = RepairProblem::new(
        single_x(&[(1, 5.0)]),
        log,
        vec![Complaint::new(TupleId(1), "x", 20.0)],
    );

    let repair = Repairer::new(Options::new(1.0)).repair(&problem).unwrap();
    assert!(repair.is_optimal());
    assert_eq!(
        repair.repaired_log()[0].to_string(),
        "UPDATE T SET x = 20 WHERE x = 5"
    );
    assert!((repair.objective() - 10.0).abs() < 1e-6);
    assert_eq!(repair.statements()[0].affected, vec![TupleId(1)]);
    assert!(!repair.statements()[0].noop);
}

#[test]
fn complaint_on_deleted_tuple_is_rejected() {
    let log = vec![Statement::delete("T", x_eq(5.0, true))];
    let problem = RepairProblem::new(
        single_x(&[(1, 5.0)]),
        log,
        vec![Complaint::new(TupleId(1), "x", 5.0)],
    );

    let err = Repairer::new(Options::new(1.0)).repair(&problem).unwrap_err();
    assert!(matches!(
        err,
        RepairError::ContradictoryComplaint { tuple: TupleId(1), .. }
    ));
}

#[test]
fn inserted_value_is_repaired() {
    let log = vec![Statement::insert(
        "T",
        TupleId(7),
        [("x", Literal::repairable(1.0))],
    )];
    let problem = RepairProblem::new(
        single_x(&[]),
        log,
        vec![Complaint::new(TupleId(7), "x", 2.0)],
    );

    let repair = Repairer::new(Options::new(1.0)).repair(&problem).unwrap();
    assert_eq!(
        repair.repaired_log()[0].to_string(),
        "INSERT INTO T (x) VALUES (2)"
    );
    assert!((repair.objective() - 1.0).abs() < 1e-6);
    assert_eq!(repair.final_state()[&TupleId(7)], vec![Value::Number(2.0)]);
}

#[test]
fn predicate_repair_narrows_an_update() {
    // Both tuples were set to 0; only t2 should have been
    let log = vec![Statement::update(
        "T",
        [("x", SetExpr::literal(Literal::fixed(0.0)))],
        vec![Condition::new("x", CompareOp::Ge, Literal::repairable(10.0))],
    )];
    let problem = RepairProblem::new(
        single_x(&[(1, 20.0), (2, 40.0)]),
        log,
        vec![Complaint::new(TupleId(1), "x", 20.0)],
    );

    let repair = Repairer::new(Options::new(1.0)).repair(&problem).unwrap();
    assert_eq!(
        repair.repaired_log()[0].to_string(),
        "UPDATE T SET x = 0 WHERE x >= 21"
    );
    // 11 of deviation plus one flipped tuple
    assert!((repair.objective() - 12.0).abs() < 1e-6);
    assert_eq!(repair.statements()[0].affected, vec![TupleId(2)]);
    assert_eq!(repair.final_state()[&TupleId(2)], vec![Value::Number(0.0)]);
}

#[test]
fn whole_statement_can_become_a_noop() {
    let log = vec![Statement::update(
        "T",
        [("x", SetExpr::literal(Literal::fixed(50.0)))],
        x_eq(5.0, true),
    )];
    let problem = RepairProblem::new(
        single_x(&[(1, 5.0)]),
        log,
        vec![Complaint::new(TupleId(1), "x", 5.0)],
    );

    let repair = Repairer::new(Options::new(1.0)).repair(&problem).unwrap();
    let outcome = &repair.statements()[0];
    assert!(outcome.changed);
    assert!(outcome.noop);
    assert!(outcome.affected.is_empty());
    assert_eq!(repair.repaired_log().len(), 1);
    // the cheapest escape moves the literal by one and drops t1
    assert!((repair.objective() - 2.0).abs() < 1e-6);
}

#[test]
fn unreachable_complaint_has_no_repair() {
    // Nothing in the log is repairable, yet the complaint wants a new value
    let log = vec![Statement::update(
        "T",
        [("x", SetExpr::literal(Literal::fixed(10.0)))],
        x_eq(5.0, false),
    )];
    let problem = RepairProblem::new(
        single_x(&[(1, 5.0)]),
        log,
        vec![Complaint::new(TupleId(1), "x", 20.0)],
    );

    let err = Repairer::new(Options::new(1.0)).repair(&problem).unwrap_err();
    assert_eq!(err, RepairError::NoRepairExists);
}

#[test]
fn malformed_statements_carry_their_index() {
    let log = vec![
        Statement::update(
            "T",
            [("x", SetExpr::literal(Literal::fixed(1.0)))],
            vec![],
        ),
        Statement::update(
            "T",
            [("y", SetExpr::literal(Literal::fixed(1.0)))],
            vec![],
        ),
    ];
    let problem = RepairProblem::new(single_x(&[(1, 5.0)]), log, vec![]);
    let err = Repairer::new(Options::new(1.0)).repair(&problem).unwrap_err();
    assert!(matches!(err, RepairError::MalformedStatement { index: 1, .. }));

    let log = vec![Statement::delete("Other", vec![])];
    let problem = RepairProblem::new(single_x(&[(1, 5.0)]), log, vec![]);
    let err = Repairer::new(Options::new(1.0)).repair(&problem).unwrap_err();
    assert!(matches!(err, RepairError::MalformedStatement { index: 0, .. }));
}

#[test]
fn out_of_domain_literal_is_a_domain_error() {
    let log = vec![Statement::update(
        "T",
        [("x", SetExpr::literal(Literal::repairable(500.0)))],
        vec![],
    )];
    let problem = RepairProblem::new(single_x(&[(1, 5.0)]), log, vec![]);
    let err = Repairer::new(Options::new(1.0)).repair(&problem).unwrap_err();
    assert!(matches!(err, RepairError::DomainError(_)));
}

#[test]
fn write_outside_the_domain_fails_before_solving() {
    let log = vec![Statement::update(
        "T",
        [("x", SetExpr::attribute("x").plus(SetExpr::literal(Literal::fixed(10.0))))],
        vec![],
    )];
    let problem = RepairProblem::new(single_x(&[(1, 95.0)]), log, vec![]);
    assert!(matches!(
        replay(problem.database(), problem.log()),
        Err(RepairError::DomainError(_))
    ));
    let err = Repairer::new(Options::new(1.0)).repair(&problem).unwrap_err();
    assert!(matches!(err, RepairError::DomainError(_)));
}

#[test]
fn log_without_complaints_is_its_own_repair() {
    let log = vec![Statement::update(
        "T",
        [("x", SetExpr::attribute("x").plus(SetExpr::literal(Literal::repairable(5.0))))],
        vec![Condition::new("x", CompareOp::Gt, Literal::repairable(50.0))],
    )];
    let problem = RepairProblem::new(single_x(&[(1, 95.0), (2, 10.0)]), log, vec![]);
    let repair = Repairer::new(Options::new(1.0)).repair(&problem).unwrap();
    assert!(repair.objective().abs() < 1e-9);
    assert_eq!(repair.repaired_log(), problem.log());
    assert_eq!(repair.final_state()[&TupleId(1)], vec![Value::Number(100.0)]);
}

#[test]
fn negative_flip_weight_is_rejected() {
    let problem = RepairProblem::new(single_x(&[(1, 5.0)]), vec![], vec![]);
    let err = Repairer::new(Options::new(-1.0)).repair(&problem).unwrap_err();
    assert!(matches!(err, RepairError::InvalidArgument(_)));
}

#[test]
fn text_literal_is_repaired_within_the_dictionary() {
    let schema = Schema::new(
        "Staff",
        vec![Attribute::text("dept"), Attribute::numeric("pay", 0.0, 1000.0)],
    )
    .unwrap();
    let mut db = Database::new(schema);
    db.insert(TupleId(1), vec!["ops".into(), 100.0.into()]).unwrap();
    db.insert(TupleId(2), vec!["dev".into(), 100.0.into()]).unwrap();

    // The raise went to ops; it was meant for dev
    let log = vec![Statement::update(
        "Staff",
        [("pay", SetExpr::literal(Literal::fixed(200.0)))],
        vec![Condition::new("dept", CompareOp::Eq, Literal::repairable("ops"))],
    )];
    let complaints = vec![
        Complaint::new(TupleId(1), "pay", 100.0),
        Complaint::new(TupleId(2), "pay", 200.0),
    ];
    let problem = RepairProblem::new(db, log, complaints);

    let repair = Repairer::new(Options::new(0.5)).repair(&problem).unwrap();
    assert_eq!(
        repair.repaired_log()[0].to_string(),
        "UPDATE Staff SET pay = 200 WHERE dept = 'dev'"
    );
    // one text change plus two flips at 0.5
    assert!((repair.objective() - 2.0).abs() < 1e-6);
}

fn taxes() -> RepairProblem {
    let schema = Schema::new(
        "Taxes",
        vec![
            Attribute::numeric("A", 0.0, 100_000.0),
            Attribute::numeric("B", 0.0, 200_000.0),
            Attribute::numeric("D", -200_000.0, 200_000.0),
        ],
    )
    .unwrap();
    let mut db = Database::new(schema);
    for (id, a, b, d) in [
        (1, 9500.0, 500.0, 8550.0),
        (2, 90000.0, 22500.0, 67500.0),
        (3, 86000.0, 21500.0, 64500.0),
        (4, 86500.0, 21625.0, 64875.0),
    ] {
        db.insert(TupleId(id), vec![a.into(), b.into(), d.into()])
            .unwrap();
    }

    let log = vec![
        Statement::update(
            "Taxes",
            [(
                "B",
                SetExpr::attribute("A").plus(SetExpr::literal(Literal::repairable(1000.0))),
            )],
            vec![Condition::new("A", CompareOp::Ge, Literal::repairable(85700.0))],
        ),
        Statement::insert(
            "Taxes",
            TupleId(5),
            [
                ("A", Literal::fixed(85800.0)),
                ("B", Literal::fixed(21450.0)),
                ("D", Literal::fixed(64350.0)),
            ],
        ),
        Statement::delete(
            "Taxes",
            vec![Condition::new("A", CompareOp::Le, Literal::fixed(20000.0))],
        ),
        Statement::update(
            "Taxes",
            [("D", SetExpr::attribute("A").minus(SetExpr::attribute("B")))],
            vec![],
        ),
    ];
    let complaints = vec![
        Complaint::new(TupleId(3), "B", 21500.0),
        Complaint::new(TupleId(3), "D", 64500.0),
        Complaint::new(TupleId(4), "B", 21625.0),
        Complaint::new(TupleId(4), "D", 64875.0),
    ];
    RepairProblem::new(db, log, complaints)
}

#[test]
fn taxes_threshold_is_raised() {
    let problem = taxes();
    let repair = Repairer::new(Options::new(1.0)).repair(&problem).unwrap();

    assert!(repair.is_optimal());
    assert_eq!(
        repair.repaired_log()[0].to_string(),
        "UPDATE Taxes SET B = A + 1000 WHERE A >= 86501"
    );
    // 801 of deviation, t3 and t4 no longer updated
    assert!((repair.objective() - 803.0).abs() < 1e-6);
    assert_eq!(repair.changed_count(), 1);
    assert_eq!(repair.statements()[0].affected, vec![TupleId(2)]);

    // the rest of the log is untouched
    for outcome in &repair.statements()[1..] {
        assert!(!outcome.changed);
        assert_eq!(outcome.repaired, outcome.original);
    }

    let last = repair.final_state();
    assert!(last[&TupleId(1)].iter().all(Value::is_ghost));
    assert_eq!(
        last[&TupleId(2)],
        vec![Value::Number(90000.0), Value::Number(91000.0), Value::Number(-1000.0)]
    );
    assert_eq!(
        last[&TupleId(5)],
        vec![Value::Number(85800.0), Value::Number(21450.0), Value::Number(64350.0)]
    );

    let trace = replay(problem.database(), &repair.repaired_log()).unwrap();
    assert_eq!(trace.states(), repair.timeline());
}

#[test]
fn taxes_original_log_breaks_the_complaints() {
    let problem = taxes();
    let trace = replay(problem.database(), problem.log()).unwrap();
    assert_eq!(trace.affected(0), &[TupleId(2), TupleId(3), TupleId(4)]);
    assert_eq!(trace.final_state()[&TupleId(3)][1], Value::Number(87000.0));
    assert_eq!(trace.affected(2), &[TupleId(1)]);
}
