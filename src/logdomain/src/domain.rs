use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::{directive::Directive, level::Level};

/// ANSI decoration for the default sink; `None` means "no colour".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Red,
    Yellow,
    Blue,
    Green,
    Magenta,
    Cyan,
}

impl Colour {
    pub fn ansi_code(self) -> &'static str {
        match self {
            Colour::Red => "\x1b[31m",
            Colour::Yellow => "\x1b[33m",
            Colour::Blue => "\x1b[34m",
            Colour::Green => "\x1b[32m",
            Colour::Magenta => "\x1b[35m",
            Colour::Cyan => "\x1b[36m",
        }
    }
}

/// A named, independently level-filtered logging domain (spec §3).
pub struct Domain {
    name: String,
    level: AtomicU8,
    colour: Option<Colour>,
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name)
            .field("level", &self.level())
            .finish()
    }
}

impl Domain {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        match self.level.load(Ordering::Relaxed) {
            0 => Level::Critical,
            1 => Level::Error,
            2 => Level::Warning,
            3 => Level::Info,
            _ => Level::Debug,
        }
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level.as_u8(), Ordering::Relaxed);
    }

    pub fn colour(&self) -> Option<Colour> {
        self.colour
    }

    pub fn passes(&self, message_level: Level) -> bool {
        message_level <= self.level()
    }
}

struct Registry {
    domains: Vec<Arc<Domain>>,
    directive: Option<Directive>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        domains: Vec::new(),
        directive: None,
    })
});

static GLOBAL: Lazy<Arc<Domain>> = Lazy::new(|| {
    Arc::new(Domain {
        name: "global".to_string(),
        level: AtomicU8::new(Level::Critical.as_u8()),
        colour: None,
    })
});

/// The process's distinguished global domain (spec §3).
pub fn global_domain() -> Arc<Domain> {
    GLOBAL.clone()
}

/// Creates and registers a new domain, inheriting the global level unless
/// the active directive overrides it by name.
pub fn new_domain(name: impl Into<String>, colour: Option<Colour>) -> Arc<Domain> {
    let name = name.into();
    let mut registry = REGISTRY.lock();

    let level = registry
        .directive
        .as_ref()
        .and_then(|d| d.level_for(&name))
        .unwrap_or_else(|| global_domain().level());

    let domain = Arc::new(Domain {
        name,
        level: AtomicU8::new(level.as_u8()),
        colour,
    });

    registry.domains.push(domain.clone());
    domain
}

/// Applies `directive` to the global domain and every already-registered
/// domain whose name matches an entry (spec §4.2). Replaces any
/// previously-applied directive, so that domains registered from this
/// point on also pick it up.
pub fn apply_directive(directive: Directive) {
    let mut registry = REGISTRY.lock();

    if let Some(level) = directive.level_for(global_domain().name()) {
        global_domain().set_level(level);
    }

    for domain in &registry.domains {
        if let Some(level) = directive.level_for(domain.name()) {
            domain.set_level(level);
        }
    }

    registry.directive = Some(directive);
}

/// Default environment variable consulted by [`init_from_env`].
pub const DEFAULT_LEVELS_VAR: &str = "RUNTIME_LOG_LEVELS";

/// Reads `var_name` and, if it parses as a directive (spec §4.2), applies
/// it. A missing or malformed variable is not an error: the domains keep
/// whatever level they already have.
pub fn init_from_env(var_name: &str) {
    if let Ok(raw) = std::env::var(var_name) {
        if let Ok(directive) = Directive::parse(&raw) {
            apply_directive(directive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_domain_inherits_global_level() {
        global_domain().set_level(Level::Warning);
        let d = new_domain("test-inherit-a", None);
        assert_eq!(d.level(), Level::Warning);
    }

    #[test]
    fn directive_overrides_matching_domain_by_name() {
        let d = new_domain("test-directive-a", None);
        apply_directive(Directive::parse("test-directive-a:DEBUG").unwrap());
        assert_eq!(d.level(), Level::Debug);
    }

    #[test]
    fn directive_reaches_domains_registered_after_it_was_applied() {
        apply_directive(Directive::parse("test-directive-b:ERR").unwrap());
        let d = new_domain("test-directive-b", None);
        assert_eq!(d.level(), Level::Error);
    }

    #[test]
    fn passes_uses_message_level_le_domain_level() {
        let d = new_domain("test-passes-a", None);
        d.set_level(Level::Warning);
        assert!(d.passes(Level::Critical));
        assert!(d.passes(Level::Warning));
        assert!(!d.passes(Level::Info));
    }
}
