use std::cell::RefCell;
use std::ffi::OsStr;

/// CLI-level environment snapshot, taken once at startup. Values are passed
/// down as plain arguments; the assembler and emulator never read the
/// environment themselves.
#[derive(Clone, Copy)]
struct Env {
    step_limit: Option<u64>,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        step_limit: var_u64("OTTO_STEP_LIMIT"),
    };
    set_env(value);
}

/// Default run step limit override, if `OTTO_STEP_LIMIT` was set.
pub fn step_limit() -> Option<u64> {
    with_env(|env| env.step_limit)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_u64(name: impl AsRef<OsStr>) -> Option<u64> {
    std::env::var(name.as_ref()).ok()?.trim().parse().ok()
}
