//! Command specs and the ordered registry that holds them.

use async_trait::async_trait;

use crate::context::CommandContext;
use crate::error::{Result, StressError};

/// One soak scenario: a one-time setup and a repeatable step.
///
/// State the scenario keeps between iterations (servers, clients, counters)
/// lives in the implementing struct. The runner calls `exec` strictly
/// serially, so `&mut self` is never shared.
#[async_trait(?Send)]
pub trait CommandSpec {
    /// Human-readable unique name.
    fn name(&self) -> &str;

    /// Name of the routine behind this command, for monitoring.
    fn function_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs once before the first iteration.
    async fn setup(&mut self, _ctx: &CommandContext) -> Result<()> {
        Ok(())
    }

    /// One iteration. Any error is fatal to the run.
    async fn exec(&mut self, ctx: &CommandContext) -> Result<()>;
}

/// Ordered list of command specs with unique names.
#[derive(Default)]
pub struct CommandRegistry {
    specs: Vec<Box<dyn CommandSpec>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spec. Fails if the name is taken.
    pub fn register(&mut self, spec: Box<dyn CommandSpec>) -> Result<()> {
        if self.specs.iter().any(|s| s.name() == spec.name()) {
            return Err(StressError::DuplicateCommand(spec.name().to_string()));
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, spec: impl CommandSpec + 'static) -> Result<Self> {
        self.register(Box::new(spec))?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name())
    }

    pub(crate) fn into_specs(self) -> Vec<Box<dyn CommandSpec>> {
        self.specs
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait(?Send)]
    impl CommandSpec for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn exec(&mut self, _ctx: &CommandContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn keeps_registration_order() {
        let registry = CommandRegistry::new()
            .with(Noop("b"))
            .unwrap()
            .with(Noop("a"))
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Noop("ping"))).unwrap();
        let err = registry.register(Box::new(Noop("ping"))).unwrap_err();
        assert!(matches!(err, StressError::DuplicateCommand(ref n) if n == "ping"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn function_name_defaults_to_type_name() {
        let spec = Noop("x");
        assert!(spec.function_name().ends_with("Noop"));
    }
}
