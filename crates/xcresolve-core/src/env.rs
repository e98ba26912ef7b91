//! Environment-derived switches consumed by resolution decision points.
//!
//! The core never branches on `std::env` directly; callers construct
//! [`EnvFlags`] once (usually via [`EnvFlags::from_env`]) and inject it
//! where decisions are made, so tests can pin both flags without touching
//! the process environment.

use std::env;

/// Enables picking the scheme that matches the project name when several
/// schemes exist and none was specified.
pub const AUTOMATED_SCHEME_SELECTION_VAR: &str = "XCRESOLVE_AUTOMATED_SCHEME_SELECTION";

/// Standard continuous-integration marker.
pub const CI_VAR: &str = "CI";

/// Read-only booleans injected into scheme-selection decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvFlags {
    /// When set, a scheme named like the project is picked automatically
    /// instead of prompting.
    pub automated_scheme_selection: bool,

    /// When set, ambiguity is a hard error instead of an interactive
    /// prompt.
    pub ci: bool,
}

impl EnvFlags {
    pub fn from_env() -> Self {
        EnvFlags {
            automated_scheme_selection: truthy(AUTOMATED_SCHEME_SELECTION_VAR),
            ci: truthy(CI_VAR),
        }
    }
}

/// A variable is truthy when set to anything but the usual "off" spellings.
pub(crate) fn truthy(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => {
            let value = value.trim().to_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "off" | "no")
        }
        Err(_) => false,
    }
}

/// Numeric knob semantics: absent means `default`, set-but-unparsable
/// (including empty) means 0.
pub(crate) fn numeric(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or(0),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn truthy_spellings() {
        unsafe { env::set_var("XCRESOLVE_TEST_TRUTHY", "1") };
        assert!(truthy("XCRESOLVE_TEST_TRUTHY"));
        unsafe { env::set_var("XCRESOLVE_TEST_TRUTHY", "YES") };
        assert!(truthy("XCRESOLVE_TEST_TRUTHY"));
        unsafe { env::set_var("XCRESOLVE_TEST_TRUTHY", "false") };
        assert!(!truthy("XCRESOLVE_TEST_TRUTHY"));
        unsafe { env::set_var("XCRESOLVE_TEST_TRUTHY", "0") };
        assert!(!truthy("XCRESOLVE_TEST_TRUTHY"));
        unsafe { env::remove_var("XCRESOLVE_TEST_TRUTHY") };
        assert!(!truthy("XCRESOLVE_TEST_TRUTHY"));
    }

    #[test]
    #[serial]
    fn numeric_defaults_and_garbage() {
        unsafe { env::remove_var("XCRESOLVE_TEST_NUMERIC") };
        assert_eq!(numeric("XCRESOLVE_TEST_NUMERIC", 10), 10);
        unsafe { env::set_var("XCRESOLVE_TEST_NUMERIC", "5") };
        assert_eq!(numeric("XCRESOLVE_TEST_NUMERIC", 10), 5);
        unsafe { env::set_var("XCRESOLVE_TEST_NUMERIC", "") };
        assert_eq!(numeric("XCRESOLVE_TEST_NUMERIC", 10), 0);
        unsafe { env::set_var("XCRESOLVE_TEST_NUMERIC", "hiho") };
        assert_eq!(numeric("XCRESOLVE_TEST_NUMERIC", 10), 0);
        unsafe { env::remove_var("XCRESOLVE_TEST_NUMERIC") };
    }

    #[test]
    #[serial]
    fn flags_read_both_switches() {
        unsafe {
            env::set_var(AUTOMATED_SCHEME_SELECTION_VAR, "true");
            env::remove_var(CI_VAR);
        }
        let flags = EnvFlags::from_env();
        assert!(flags.automated_scheme_selection);
        assert!(!flags.ci);
        unsafe { env::remove_var(AUTOMATED_SCHEME_SELECTION_VAR) };
    }
}
