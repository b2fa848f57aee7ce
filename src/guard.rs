//! Pre-flight check for mutating runs.
//!
//! `restore` and `fix` rewrite every entry below their base directory without
//! asking. Pointed at `$HOME` or `/etc` that locks people out of their
//! accounts or breaks the host, so both consult [`SafetyGuard::check`] once,
//! before touching anything, and abort on rejection.

use crate::error::GuardRejection;
use crate::names;
use std::path::{Component, Path, PathBuf};

/// System directories no mutating run may enter, contain, or be contained in.
pub const DEFAULT_PROTECTED_ROOTS: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/lib", "/lib32", "/lib64", "/opt", "/proc", "/root",
    "/sbin", "/sys", "/usr", "/var",
];

/// Environment variable with extra protected roots, `:`-separated.
pub const PROTECT_ENV: &str = "PERMSNAP_PROTECT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected(GuardRejection),
}

#[derive(Debug, Clone)]
struct Protected {
    label: &'static str,
    /// The path as configured plus its canonical form, when that differs.
    forms: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SafetyGuard {
    protected: Vec<Protected>,
}

impl SafetyGuard {
    pub fn new<I, P>(home: Option<PathBuf>, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut guard = SafetyGuard { protected: Vec::new() };
        if let Some(home) = home {
            guard.protect("home directory", &home);
        }
        for root in roots {
            guard.protect("protected system directory", root.as_ref());
        }
        guard
    }

    /// Home directory of the invoking user plus [`DEFAULT_PROTECTED_ROOTS`].
    pub fn system() -> Self {
        Self::new(names::home_dir(), DEFAULT_PROTECTED_ROOTS)
    }

    /// Adds operator-supplied roots.
    pub fn with_extra_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for root in roots {
            self.protect("operator-protected directory", root.as_ref());
        }
        self
    }

    /// Reads extra roots from [`PROTECT_ENV`].
    pub fn with_env_roots(self) -> Self {
        match std::env::var_os(PROTECT_ENV) {
            Some(value) => {
                let roots: Vec<PathBuf> = std::env::split_paths(&value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect();
                self.with_extra_roots(roots)
            }
            None => self,
        }
    }

    fn protect(&mut self, label: &'static str, path: &Path) {
        let plain = lexical_absolute(path);
        let mut forms = vec![plain.clone()];
        if let Ok(canonical) = plain.canonicalize() {
            if canonical != plain {
                forms.push(canonical);
            }
        }
        self.protected.push(Protected { label, forms });
    }

    /// Decides whether a mutating run may use `candidate` as its root.
    pub fn check(&self, candidate: &Path) -> Verdict {
        let plain = lexical_absolute(candidate);
        let mut candidates = vec![plain.clone()];
        if let Ok(canonical) = plain.canonicalize() {
            if canonical != plain {
                candidates.push(canonical);
            }
        }

        for protected in &self.protected {
            for form in &protected.forms {
                for cand in &candidates {
                    let relation = if cand == form {
                        "is"
                    } else if cand.starts_with(form) {
                        "is inside"
                    } else if form.starts_with(cand) {
                        "contains"
                    } else {
                        continue;
                    };
                    return Verdict::Rejected(GuardRejection {
                        candidate: candidate.to_path_buf(),
                        reason: format!("{relation} the {} '{}'", protected.label, form.display()),
                    });
                }
            }
        }
        Verdict::Allowed
    }

    /// [`check`](Self::check) as a `Result`.
    pub fn ensure_allowed(&self, candidate: &Path) -> Result<(), GuardRejection> {
        match self.check(candidate) {
            Verdict::Allowed => Ok(()),
            Verdict::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Makes `path` absolute and folds `.`/`..` without touching the filesystem.
fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
