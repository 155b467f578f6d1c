//! A restricted `rhai` engine: arithmetic/logic/string/array/map/time
//! packages only, explicit native-function whitelist for anything beyond
//! that, and hard ceilings on operation count, expression depth, and
//! string size. No package here grants filesystem, network, process, or
//! `eval` access — `rhai` itself has none of those built in, so the
//! restriction surface is the packages we choose to register plus the
//! few helper functions below.

use rhai::packages::{ArithmeticPackage, BasicArrayPackage, BasicMapPackage, BasicStringPackage, BasicTimePackage, CorePackage, LogicPackage, Package};
use rhai::{Array, Dynamic, Engine};

use regex::Regex;

/// Ceilings applied to every evaluation. `max_operations`/`max_expr_depth`
/// bound runaway or deeply nested expressions independent of the wall
/// clock; the wall-clock timeout itself is enforced by `RhaiSandbox::eval`
/// via an `on_progress` deadline check, not here.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_operations: u64,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_expr_depth: 64,
            max_string_size: 64 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

pub fn build_engine(limits: Limits) -> Engine {
    let mut engine = Engine::new_raw();

    CorePackage::new().register_into_engine(&mut engine);
    ArithmeticPackage::new().register_into_engine(&mut engine);
    LogicPackage::new().register_into_engine(&mut engine);
    BasicStringPackage::new().register_into_engine(&mut engine);
    BasicArrayPackage::new().register_into_engine(&mut engine);
    BasicMapPackage::new().register_into_engine(&mut engine);
    BasicTimePackage::new().register_into_engine(&mut engine);

    register_whitelisted_functions(&mut engine);

    engine.set_max_operations(limits.max_operations);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);

    engine
}

fn register_whitelisted_functions(engine: &mut Engine) {
    engine.register_fn("len", |arr: Array| -> i64 { arr.len() as i64 });
    engine.register_fn("min", |a: i64, b: i64| -> i64 { a.min(b) });
    engine.register_fn("min", |a: f64, b: f64| -> f64 { a.min(b) });
    engine.register_fn("max", |a: i64, b: i64| -> i64 { a.max(b) });
    engine.register_fn("max", |a: f64, b: f64| -> f64 { a.max(b) });
    engine.register_fn("sum", |arr: Array| -> Dynamic {
        let mut total = 0f64;
        let mut all_int = true;
        for item in &arr {
            if let Some(i) = item.clone().try_cast::<i64>() {
                total += i as f64;
            } else if let Some(f) = item.clone().try_cast::<f64>() {
                total += f;
                all_int = false;
            }
        }
        if all_int {
            Dynamic::from(total as i64)
        } else {
            Dynamic::from(total)
        }
    });
    engine.register_fn("sorted", |mut arr: Array| -> Array {
        arr.sort_by(|a, b| {
            let a = a.clone().try_cast::<i64>();
            let b = b.clone().try_cast::<i64>();
            match (a, b) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => std::cmp::Ordering::Equal,
            }
        });
        arr
    });
    engine.register_fn("matches", |pattern: &str, text: &str| -> bool {
        Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false)
    });
    engine.register_fn("today_iso", || -> String { chrono::Utc::now().date_naive().to_string() });
    engine.register_fn("now_millis", || -> i64 { chrono::Utc::now().timestamp_millis() });
}
