//! Host functions installed into every VM.

use std::sync::OnceLock;
use std::time::Instant;

use super::value::Value;
use super::vm::Vm;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Install the standard natives.
pub fn install(vm: &mut Vm) {
    EPOCH.get_or_init(Instant::now);
    vm.define_native("clock", 0, clock);
}

/// Seconds elapsed since the first VM in this process was created.
fn clock(_args: &[Value]) -> Result<Value, String> {
    let epoch = EPOCH.get_or_init(Instant::now);
    Ok(Value::Number(epoch.elapsed().as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let first = clock(&[]).unwrap().as_number().unwrap();
        let second = clock(&[]).unwrap().as_number().unwrap();
        assert!(first >= 0.0);
        assert!(second >= first);
    }
}
