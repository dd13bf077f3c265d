use twine_core::context::Context;
use twine_core::error::{Result, TwineError};
use twine_core::graph::Graph;
use twine_core::registry::Registry;

/// The default processor list used when configuration yields none:
/// fetch the graph's prior state, run every `pre:`-prefixed processor,
/// push the result back to the store, then run every
/// `post:`-prefixed processor.
pub const DEFAULT_WORKFLOW: &[&str] = &["sparql-get", "pre", "sparql-put", "post"];

/// An ordered, resolved list of processor names to run against every
/// graph. `pre`/`post` are pseudo-processors: at run time they fan out
/// to every processor registered with a name starting `pre:`/`post:`,
/// in registration order, rather than naming one handler directly.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<String>,
}

impl Pipeline {
    /// Parse a `workflow=foo,bar,baz` configuration value: processor
    /// names separated by commas, semicolons, or whitespace (any
    /// combination), with empty elements skipped. An empty or
    /// all-whitespace value yields [`DEFAULT_WORKFLOW`].
    pub fn parse(spec: &str) -> Self {
        let steps: Vec<String> = spec
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if steps.is_empty() {
            Self {
                steps: DEFAULT_WORKFLOW.iter().map(|s| s.to_string()).collect(),
            }
        } else {
            Self { steps }
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Confirm every named step resolves to either a registered
    /// processor, or the `pre`/`post` pseudo-processors, so
    /// configuration errors are caught at startup rather than on the
    /// first message that reaches an unresolvable step.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        for name in &self.steps {
            if name == "pre" || name == "post" {
                continue;
            }
            if !registry.processor_exists(name) {
                return Err(TwineError::BadConfig(format!("workflow references unknown processor '{name}'")));
            }
        }
        Ok(())
    }

    /// Run every step against `graph` in order, stopping at the first
    /// failure.
    pub fn run(&self, ctx: &Context, graph: &mut Graph) -> Result<()> {
        for name in &self.steps {
            tracing::debug!(processor = %name, graph = %graph.uri(), "invoking graph processor");
            match name.as_str() {
                "pre" => self.run_fanout(ctx, graph, "pre:")?,
                "post" => self.run_fanout(ctx, graph, "post:")?,
                other => {
                    let registry = ctx.registry().read().expect("registry lock poisoned");
                    registry.resolve_processor(ctx, other, graph)?;
                }
            }
        }
        Ok(())
    }

    fn run_fanout(&self, ctx: &Context, graph: &mut Graph, prefix: &str) -> Result<()> {
        let names = ctx.registry().read().expect("registry lock poisoned").processors_with_prefix(prefix);
        for name in names {
            let registry = ctx.registry().read().expect("registry lock poisoned");
            registry.resolve_processor(ctx, &name, graph)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twine_core::config::Config;
    use twine_core::plugin::PluginToken;

    #[test]
    fn empty_spec_yields_default_workflow() {
        let pipeline = Pipeline::parse("   ");
        assert_eq!(pipeline.steps(), DEFAULT_WORKFLOW);
    }

    #[test]
    fn mixed_separators_are_all_accepted_and_empties_skipped() {
        let pipeline = Pipeline::parse("sparql-get,, pre;  sparql-put\tpost");
        assert_eq!(pipeline.steps(), &["sparql-get", "pre", "sparql-put", "post"]);
    }

    #[test]
    fn validate_rejects_unknown_processor_names() {
        let registry = Registry::new();
        let pipeline = Pipeline::parse("not-registered");
        assert!(pipeline.validate(&registry).is_err());
    }

    #[test]
    fn validate_accepts_pre_and_post_without_requiring_registration() {
        let registry = Registry::new();
        let pipeline = Pipeline::parse("pre,post");
        assert!(pipeline.validate(&registry).is_ok());
    }

    #[test]
    fn pre_fanout_runs_in_registration_order() {
        let ctx = Context::builder(Config::empty("twine")).build();
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let mut registry = ctx.registry().write().unwrap();
            let o1 = order.clone();
            registry.register_processor(
                PluginToken::new(1),
                "pre:first",
                Box::new(move |_, _| {
                    o1.lock().unwrap().push("first");
                    Ok(())
                }),
            );
            let o2 = order.clone();
            registry.register_processor(
                PluginToken::new(2),
                "pre:second",
                Box::new(move |_, _| {
                    o2.lock().unwrap().push("second");
                    Ok(())
                }),
            );
        }
        let pipeline = Pipeline::parse("pre");
        let mut graph = Graph::new("http://example.org/g1").unwrap();
        pipeline.run(&ctx, &mut graph).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}
