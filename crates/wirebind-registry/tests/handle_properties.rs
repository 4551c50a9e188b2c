//! Property tests for the handle tables.

use std::collections::BTreeSet;

use proptest::prelude::*;
use wirebind_core::{HostFunction, Value};
use wirebind_registry::{CallbackRegistry, ValueObjectPool};

#[derive(Debug, Clone)]
enum Op {
    Register,
    Retain(usize),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Register),
        (0usize..16).prop_map(Op::Retain),
        (0usize..16).prop_map(Op::Release),
    ]
}

fn callback() -> Value {
    Value::Function(HostFunction::new(|_| Ok(Value::Undefined)))
}

proptest! {
    #[test]
    fn live_callback_handles_are_unique_and_non_zero(ops in prop::collection::vec(op(), 1..64)) {
        let mut registry = CallbackRegistry::new();
        // handle -> expected ref count
        let mut live: Vec<(u32, u32)> = Vec::new();
        let mut freed: Vec<u32> = Vec::new();

        for op in ops {
            match op {
                Op::Register => {
                    let handle = registry.register(&callback()).unwrap().raw();
                    prop_assert_ne!(handle, 0);
                    if let Some(expected) = freed.pop() {
                        prop_assert_eq!(handle, expected);
                    }
                    live.push((handle, 1));
                }
                Op::Retain(i) if !live.is_empty() => {
                    let slot = i % live.len();
                    live[slot].1 += 1;
                    prop_assert_eq!(registry.retain(live[slot].0).unwrap(), live[slot].1);
                }
                Op::Release(i) if !live.is_empty() => {
                    let slot = i % live.len();
                    live[slot].1 -= 1;
                    let (handle, count) = live[slot];
                    prop_assert_eq!(registry.release(handle).unwrap(), count);
                    if count == 0 {
                        live.remove(slot);
                        freed.push(handle);
                    } else {
                        prop_assert!(registry.get(handle).is_ok());
                    }
                }
                _ => {}
            }

            let unique: BTreeSet<u32> = live.iter().map(|(h, _)| *h).collect();
            prop_assert_eq!(unique.len(), live.len());
            prop_assert_eq!(registry.len(), live.len());
        }
    }

    #[test]
    fn value_pool_round_trip(values in prop::collection::vec(any::<f64>().prop_filter("nan", |v| !v.is_nan()), 1..32)) {
        let mut pool = ValueObjectPool::new();
        let indices: Vec<u32> = values.iter().map(|v| pool.push(Value::Number(*v))).collect();

        for (index, value) in indices.iter().zip(&values) {
            prop_assert_eq!(pool.pop(*index).unwrap(), Value::Number(*value));
            prop_assert!(pool.pop(*index).is_err());
        }
        prop_assert!(pool.is_empty());
    }
}
