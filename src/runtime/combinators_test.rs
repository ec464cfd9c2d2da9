use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    error::HandleError,
    runtime::{
        Runtime,
        class_table::{ClassBuilder, ClassTable},
        combinators::{
            bind_argument, bind_to, collect_arguments, constant, drop_arguments, filter_argument,
            filter_return_value, identity, permute_arguments,
        },
        handle::Handle,
        host::Visibility,
        value::{Thrown, Value},
    },
    types::{Kind, TypeDescriptor},
};

type Log = Arc<Mutex<Vec<String>>>;

fn desc(text: &str) -> TypeDescriptor {
    text.parse().unwrap()
}

fn int_at(args: &[Value], index: usize) -> i32 {
    args[index].as_int().unwrap()
}

struct Fixture {
    rt: Runtime,
    log: Log,
}

impl Fixture {
    fn new() -> Self {
        let log: Log = Arc::default();
        let table = ClassTable::new();
        let show_log = log.clone();
        let tick_log = log.clone();
        let fail = Thrown::new("IllegalState", "boom");
        table.define(
            ClassBuilder::class("Ops")
                .static_method("add", Visibility::Public, desc("(int,int)->int"), |args| {
                    Ok(Value::Int(int_at(&args, 0).wrapping_add(int_at(&args, 1))))
                })
                .static_method("increment", Visibility::Public, desc("(int)->int"), |args| {
                    Ok(Value::Int(int_at(&args, 0).wrapping_add(1)))
                })
                .static_method("negate", Visibility::Public, desc("(int)->int"), |args| {
                    Ok(Value::Int(int_at(&args, 0).wrapping_neg()))
                })
                .static_method("sum3", Visibility::Public, desc("(int,int,int)->int"), |args| {
                    Ok(Value::Int(args.iter().filter_map(Value::as_int).sum()))
                })
                .static_method(
                    "digits",
                    Visibility::Public,
                    desc("(int,int,int,int)->int"),
                    |args| {
                        let digits = args.iter().filter_map(Value::as_int);
                        Ok(Value::Int(digits.fold(0, |acc, d| acc * 10 + d)))
                    },
                )
                .static_method(
                    "show",
                    Visibility::Public,
                    desc("(int,int,int)->void"),
                    move |args| {
                        show_log.lock().push(format!(
                            "x={},y={},z={}",
                            int_at(&args, 0),
                            int_at(&args, 1),
                            int_at(&args, 2)
                        ));
                        Ok(Value::Void)
                    },
                )
                .static_method("tick", Visibility::Public, desc("(int)->void"), move |args| {
                    tick_log.lock().push(format!("tick {}", int_at(&args, 0)));
                    Ok(Value::Void)
                })
                .static_method("fail", Visibility::Public, desc("(int)->int"), move |_| {
                    Err(fail.clone().into())
                }),
        );
        table.define(
            ClassBuilder::class("Counter")
                .field("value", Visibility::Public, Kind::Int)
                .constructor(Visibility::Public, desc("()->void"), |_| Ok(Value::Void))
                .method("plus", Visibility::Public, desc("(int)->int"), |args| {
                    let this = args[0].as_object().unwrap();
                    let current = this.field("value").and_then(|v| v.as_int()).unwrap_or(0);
                    Ok(Value::Int(current + int_at(&args, 1)))
                }),
        );
        Self {
            rt: Runtime::new(Arc::new(table)),
            log,
        }
    }

    fn op(&self, name: &str, ty: &str) -> Handle {
        self.rt.public_lookup().find_static("Ops", name, desc(ty)).unwrap()
    }

    fn logged(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

fn call(h: &Handle, args: Vec<Value>) -> Value {
    h.invoke_exact(&h.descriptor().clone(), args).unwrap()
}

#[test]
fn bound_argument_is_spliced_back_in() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let add10 = bind_argument(&add, 1, Value::Int(10)).unwrap();
    assert_eq!(add10.descriptor(), &desc("(int)->int"));
    assert_eq!(call(&add10, vec![Value::Int(5)]), Value::Int(15));
    assert_eq!(call(&add, vec![Value::Int(5), Value::Int(10)]), Value::Int(15));
    assert_eq!(add.descriptor(), &desc("(int,int)->int"));
}

#[test]
fn bind_rejects_bad_index_and_value() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let err = bind_argument(&add, 2, Value::Int(1)).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"index 2 out of range for 2 parameters");
    assert_eq!(err.code(), "E2007");

    let err = bind_argument(&add, 0, Value::Long(1)).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"type mismatch: expected int, got long");
}

#[test]
fn bind_to_captures_a_receiver() {
    let fx = Fixture::new();
    let lookup = fx.rt.public_lookup();
    let counter = lookup
        .find_constructor("Counter", desc("()->void"))
        .unwrap()
        .invoke_exact(&desc("()->Counter"), vec![])
        .unwrap();
    counter.as_object().unwrap().set_field("value", Value::Int(40));

    let plus = lookup.find_virtual("Counter", "plus", desc("(int)->int")).unwrap();
    let bound = bind_to(&plus, counter).unwrap();
    assert_eq!(bound.descriptor(), &desc("(int)->int"));
    assert_eq!(call(&bound, vec![Value::Int(2)]), Value::Int(42));

    let err = bind_to(&fx.op("add", "(int,int)->int"), Value::Int(1)).unwrap_err();
    assert!(matches!(err, HandleError::TypeMismatch { .. }));
}

#[test]
fn bound_reference_must_be_an_instance_of_the_slot() {
    let fx = Fixture::new();
    let plus = fx
        .rt
        .public_lookup()
        .find_virtual("Counter", "plus", desc("(int)->int"))
        .unwrap();
    let stranger = Value::object(Arc::new(crate::runtime::value::Instance::new("Ops".into())));
    let err = bind_to(&plus, stranger).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"type mismatch: expected Counter, got Ops");
    assert!(bind_to(&plus, Value::null()).is_ok());
}

#[test]
fn filtered_argument_reaches_the_target() {
    let fx = Fixture::new();
    let show = fx.op("show", "(int,int,int)->void");
    let increment = fx.op("increment", "(int)->int");
    let filtered = filter_argument(&show, 1, &increment).unwrap();
    assert_eq!(filtered.descriptor(), show.descriptor());

    call(&filtered, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(fx.logged(), vec!["x=1,y=3,z=3".to_string()]);
}

#[test]
fn filter_may_change_the_parameter_kind() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let lookup = fx.rt.public_lookup();
    let value_of = lookup
        .find_getter("Counter", "value", Kind::Int)
        .unwrap();
    let filtered = filter_argument(&add, 0, &value_of).unwrap();
    assert_eq!(filtered.descriptor(), &desc("(Counter,int)->int"));

    let counter = lookup
        .find_constructor("Counter", desc("()->void"))
        .unwrap()
        .invoke_exact(&desc("()->Counter"), vec![])
        .unwrap();
    counter.as_object().unwrap().set_field("value", Value::Int(7));
    assert_eq!(call(&filtered, vec![counter, Value::Int(1)]), Value::Int(8));
}

#[test]
fn filter_shape_is_checked_up_front() {
    let fx = Fixture::new();
    let show = fx.op("show", "(int,int,int)->void");
    let add = fx.op("add", "(int,int)->int");
    let err = filter_argument(&show, 0, &add).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"wrong number of parameters for argument filter: expected 1, got 2"
    );
    assert_eq!(err.code(), "E2006");

    let widen = identity(&fx.rt, Kind::Long).unwrap();
    let err = filter_argument(&show, 0, &widen).unwrap_err();
    assert!(matches!(err, HandleError::TypeMismatch { .. }));

    let err = filter_argument(&show, 3, &fx.op("increment", "(int)->int")).unwrap_err();
    assert!(matches!(err, HandleError::Index { index: 3, len: 3 }));
}

#[test]
fn return_filter_sees_the_result() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let negated = filter_return_value(&add, &fx.op("negate", "(int)->int")).unwrap();
    assert_eq!(call(&negated, vec![Value::Int(2), Value::Int(3)]), Value::Int(-5));

    let show = fx.op("show", "(int,int,int)->void");
    let answer = constant(&fx.rt, Kind::Int, Value::Int(42)).unwrap();
    let then_answer = filter_return_value(&show, &answer).unwrap();
    assert_eq!(then_answer.descriptor(), &desc("(int,int,int)->int"));
    let result = call(&then_answer, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(result, Value::Int(42));
    assert_eq!(fx.logged(), vec!["x=1,y=2,z=3".to_string()]);

    let err = filter_return_value(&show, &fx.op("negate", "(int)->int")).unwrap_err();
    assert!(matches!(err, HandleError::Arity { .. }));
}

#[test]
fn collector_replaces_a_parameter_with_its_own() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let sum3 = fx.op("sum3", "(int,int,int)->int");
    let collected = collect_arguments(&add, 1, &sum3).unwrap();
    assert_eq!(collected.descriptor(), &desc("(int,int,int,int)->int"));
    let result = call(
        &collected,
        vec![Value::Int(1000), Value::Int(1), Value::Int(2), Value::Int(3)],
    );
    assert_eq!(result, Value::Int(1006));
}

#[test]
fn void_collector_runs_for_its_effect() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let tick = fx.op("tick", "(int)->void");
    let collected = collect_arguments(&add, 2, &tick).unwrap();
    assert_eq!(collected.descriptor(), &desc("(int,int,int)->int"));
    let result = call(&collected, vec![Value::Int(2), Value::Int(3), Value::Int(9)]);
    assert_eq!(result, Value::Int(5));
    assert_eq!(fx.logged(), vec!["tick 9".to_string()]);

    let front = collect_arguments(&add, 0, &tick).unwrap();
    assert_eq!(front.descriptor(), &desc("(int,int,int)->int"));
    let result = call(&front, vec![Value::Int(7), Value::Int(2), Value::Int(3)]);
    assert_eq!(result, Value::Int(5));
    assert_eq!(fx.logged().last().map(String::as_str), Some("tick 7"));
}

#[test]
fn collector_with_no_parameters_fills_the_slot() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let seven = constant(&fx.rt, Kind::Int, Value::Int(7)).unwrap();
    let collected = collect_arguments(&add, 0, &seven).unwrap();
    assert_eq!(collected.descriptor(), &desc("(int)->int"));
    assert_eq!(call(&collected, vec![Value::Int(1)]), Value::Int(8));

    let long = constant(&fx.rt, Kind::Long, Value::Long(7)).unwrap();
    let err = collect_arguments(&add, 0, &long).unwrap_err();
    assert!(matches!(err, HandleError::TypeMismatch { .. }));
}

#[test]
fn permutation_duplicates_and_reorders() {
    let fx = Fixture::new();
    let digits = fx.op("digits", "(int,int,int,int)->int");
    let permuted = permute_arguments(&digits, &desc("(int,int,int)->int"), &[1, 0, 2, 2]).unwrap();
    let result = call(&permuted, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let direct = call(
        &digits,
        vec![Value::Int(2), Value::Int(1), Value::Int(3), Value::Int(3)],
    );
    assert_eq!(result, direct);
    assert_eq!(result, Value::Int(2133));
}

#[test]
fn permutation_may_ignore_parameters() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let permuted = permute_arguments(&add, &desc("(int,long,int)->int"), &[2, 0]).unwrap();
    let result = call(&permuted, vec![Value::Int(1), Value::Long(99), Value::Int(20)]);
    assert_eq!(result, Value::Int(21));
}

#[test]
fn permutation_is_validated() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let err = permute_arguments(&add, &desc("(int,int)->int"), &[0]).unwrap_err();
    assert!(matches!(err, HandleError::Arity { context: "permutation", .. }));

    let err = permute_arguments(&add, &desc("(int,long)->int"), &[0, 1]).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"type mismatch: expected int, got long");
    assert_eq!(err.code(), "E2008");

    let err = permute_arguments(&add, &desc("(int,int)->int"), &[0, 2]).unwrap_err();
    assert!(matches!(err, HandleError::Index { index: 2, len: 2 }));

    let err = permute_arguments(&add, &desc("(int,int)->long"), &[0, 1]).unwrap_err();
    assert!(matches!(err, HandleError::TypeMismatch { .. }));
}

#[test]
fn dropped_arguments_are_ignored() {
    let fx = Fixture::new();
    let add = fx.op("add", "(int,int)->int");
    let dropped = drop_arguments(&add, 1, &[Kind::Long, Kind::Boolean]).unwrap();
    assert_eq!(dropped.descriptor(), &desc("(int,long,boolean,int)->int"));
    let result = call(
        &dropped,
        vec![Value::Int(2), Value::Long(0), Value::Boolean(true), Value::Int(3)],
    );
    assert_eq!(result, Value::Int(5));

    let err = drop_arguments(&add, 0, &[Kind::Void]).unwrap_err();
    assert!(matches!(err, HandleError::InvalidDescriptor { .. }));
}

#[test]
fn constant_and_identity() {
    let fx = Fixture::new();
    let five = constant(&fx.rt, Kind::Int, Value::Int(5)).unwrap();
    assert_eq!(five.descriptor(), &desc("()->int"));
    assert_eq!(call(&five, vec![]), Value::Int(5));

    let id = identity(&fx.rt, Kind::Double).unwrap();
    assert_eq!(call(&id, vec![Value::Double(1.5)]), Value::Double(1.5));

    assert!(constant(&fx.rt, Kind::Int, Value::Long(5)).is_err());
    assert!(identity(&fx.rt, Kind::Void).is_err());
}

#[test]
fn thrown_failures_pass_through_chains_unwrapped() {
    let fx = Fixture::new();
    let fail = fx.op("fail", "(int)->int");
    let chain = filter_return_value(
        &filter_argument(&fail, 0, &fx.op("increment", "(int)->int")).unwrap(),
        &fx.op("negate", "(int)->int"),
    )
    .unwrap();

    let first = match chain.invoke_exact(&desc("(int)->int"), vec![Value::Int(1)]) {
        Err(HandleError::Thrown(t)) => t,
        other => panic!("expected a thrown failure, got {:?}", other),
    };
    let second = match fail.invoke_exact(&desc("(int)->int"), vec![Value::Int(1)]) {
        Err(HandleError::Thrown(t)) => t,
        other => panic!("expected a thrown failure, got {:?}", other),
    };
    assert!(Thrown::ptr_eq(&first, &second));
    assert_eq!(first.message(), "boom");
}
