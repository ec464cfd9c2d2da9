#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use flux_handles::{
    Handle, Runtime, RuntimeConfig, TypeDescriptor, Value,
    runtime::{
        class_table::{ClassBuilder, ClassTable},
        host::Visibility,
    },
    types::Kind,
};
use parking_lot::Mutex;

/// Routes crate logs to the test writer once per process. `RUST_LOG`
/// selects the level, defaulting to warnings only.
pub fn init_logging() {
    static INITIALISED: OnceLock<()> = OnceLock::new();
    INITIALISED.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn desc(text: &str) -> TypeDescriptor {
    text.parse()
        .unwrap_or_else(|e| panic!("bad descriptor `{text}`: {e}"))
}

pub fn int(value: &Value) -> i32 {
    value
        .as_int()
        .unwrap_or_else(|| panic!("expected an int, got {value}"))
}

/// A small world: `Calc` with static arithmetic, a `Shape` interface with a
/// `Square` implementation, and a `Printer` that records what it prints.
pub struct World {
    pub rt: Runtime,
    pub printed: Arc<Mutex<Vec<String>>>,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        init_logging();
        let printed: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = printed.clone();
        let table = ClassTable::new();

        table.define(
            ClassBuilder::class("Calc")
                .package("math")
                .static_method("add", Visibility::Public, desc("(int,int)->int"), |args| {
                    Ok(Value::Int(int(&args[0]).wrapping_add(int(&args[1]))))
                })
                .static_method("increment", Visibility::Public, desc("(int)->int"), |args| {
                    Ok(Value::Int(int(&args[0]).wrapping_add(1)))
                })
                .static_method("double", Visibility::Public, desc("(int)->int"), |args| {
                    Ok(Value::Int(int(&args[0]).wrapping_mul(2)))
                })
                .static_method(
                    "digits",
                    Visibility::Public,
                    desc("(int,int,int,int)->int"),
                    |args| {
                        Ok(Value::Int(args.iter().map(int).fold(0, |acc, d| acc * 10 + d)))
                    },
                )
                .static_method("hidden", Visibility::Private, desc("()->int"), |_| {
                    Ok(Value::Int(0))
                }),
        );

        table.define(
            ClassBuilder::class("Printer")
                .package("io")
                .static_method(
                    "print3",
                    Visibility::Public,
                    desc("(int,int,int)->void"),
                    move |args| {
                        sink.lock().push(format!(
                            "x={},y={},z={}",
                            int(&args[0]),
                            int(&args[1]),
                            int(&args[2])
                        ));
                        Ok(Value::Void)
                    },
                ),
        );

        table.define(
            ClassBuilder::interface("Shape")
                .package("geom")
                .abstract_method("area", Visibility::Public, desc("()->long")),
        );
        table.define(
            ClassBuilder::class("Square")
                .package("geom")
                .implements("Shape")
                .field("side", Visibility::Private, Kind::Long)
                .constructor(Visibility::Public, desc("(long)->void"), |args| {
                    if let Some(this) = args[0].as_object() {
                        this.set_field("side", args[1].clone());
                    }
                    Ok(Value::Void)
                })
                .method("area", Visibility::Public, desc("()->long"), |args| {
                    let side = args[0]
                        .as_object()
                        .and_then(|this| this.field("side"))
                        .and_then(|v| v.as_long())
                        .unwrap_or(0);
                    Ok(Value::Long(side * side))
                }),
        );

        Self {
            rt: Runtime::with_config(Arc::new(table), config),
            printed,
        }
    }

    pub fn calc(&self, name: &str, ty: &str) -> Handle {
        self.rt
            .public_lookup()
            .find_static("Calc", name, desc(ty))
            .unwrap_or_else(|e| panic!("Calc.{name}: {e}"))
    }

    pub fn square(&self, side: i64) -> Value {
        self.rt
            .public_lookup()
            .find_constructor("Square", desc("(long)->void"))
            .and_then(|ctor| ctor.invoke_exact(&desc("(long)->Square"), vec![Value::Long(side)]))
            .unwrap_or_else(|e| panic!("new Square: {e}"))
    }

    pub fn printed(&self) -> Vec<String> {
        self.printed.lock().clone()
    }
}
