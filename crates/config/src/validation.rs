//! Configuration validation
//!
//! Checks the pipeline model for consistency:
//! - Worker counts and buffer capacities are non-zero
//! - Route names are unique per pipeline and sinks only subscribe to
//!   declared routes (or `_default`)
//! - `pipeline` sinks point at existing, pipeline-sourced pipelines
//! - Every pipeline-sourced pipeline has an upstream
//! - Forwarding between pipelines forms no cycle

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::pipeline::{DEFAULT_ROUTE, PipelineConfig};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.pipelines.is_empty() {
        return Err(ConfigError::NoPipelines);
    }
    if config.global.workers == 0 {
        return Err(ConfigError::invalid_value("global", "global", "workers", "must be at least 1"));
    }
    if config.global.buffer_capacity == 0 {
        return Err(ConfigError::invalid_value(
            "global",
            "global",
            "buffer_capacity",
            "must be at least 1",
        ));
    }

    for (name, pipeline) in &config.pipelines {
        validate_pipeline(name, pipeline)?;
    }
    validate_connections(&config.pipelines)?;
    detect_cycles(&config.pipelines)
}

fn validate_pipeline(name: &str, pipeline: &PipelineConfig) -> Result<()> {
    if pipeline.workers == Some(0) {
        return Err(ConfigError::invalid_value("pipeline", name, "workers", "must be at least 1"));
    }
    if pipeline.buffer_capacity == Some(0) {
        return Err(ConfigError::invalid_value(
            "pipeline",
            name,
            "buffer_capacity",
            "must be at least 1",
        ));
    }
    if pipeline.source.plugin_type.is_empty() {
        return Err(ConfigError::missing_field("pipeline", name, "source.type"));
    }
    if pipeline.processors.iter().any(|p| p.plugin_type.is_empty()) {
        return Err(ConfigError::missing_field("pipeline", name, "processors.type"));
    }

    let mut routes = HashSet::with_capacity(pipeline.routes.len());
    for route in &pipeline.routes {
        if route.name == DEFAULT_ROUTE {
            return Err(ConfigError::invalid_value(
                "pipeline",
                name,
                "routes",
                format!("'{DEFAULT_ROUTE}' is reserved"),
            ));
        }
        if route.condition.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "pipeline",
                name,
                "routes",
                format!("route '{}' has an empty condition", route.name),
            ));
        }
        if !routes.insert(route.name.as_str()) {
            return Err(ConfigError::duplicate_route(name, &route.name));
        }
    }

    if pipeline.sinks.is_empty() {
        return Err(ConfigError::missing_field("pipeline", name, "sinks"));
    }
    for (index, sink) in pipeline.sinks.iter().enumerate() {
        if sink.is_pipeline() && sink.pipeline.is_none() {
            return Err(ConfigError::missing_field(
                "sink",
                sink.display_name(index),
                "pipeline",
            ));
        }
        for route in &sink.routes {
            if route != DEFAULT_ROUTE && !routes.contains(route.as_str()) {
                return Err(ConfigError::unknown_route(name, sink.display_name(index), route));
            }
        }
    }

    Ok(())
}

fn validate_connections(pipelines: &BTreeMap<String, PipelineConfig>) -> Result<()> {
    let mut fed: HashSet<&str> = HashSet::new();

    for (name, pipeline) in pipelines {
        for target in pipeline.downstream() {
            let Some(downstream) = pipelines.get(target) else {
                return Err(ConfigError::unknown_pipeline(target, name));
            };
            if !downstream.source.is_pipeline() {
                return Err(ConfigError::NotPipelineSourced {
                    pipeline: target.to_string(),
                    upstream: name.clone(),
                    source_type: downstream.source.plugin_type.clone(),
                });
            }
            fed.insert(target);
        }
    }

    for (name, pipeline) in pipelines {
        if pipeline.source.is_pipeline() && !fed.contains(name.as_str()) {
            return Err(ConfigError::OrphanPipelineSource {
                pipeline: name.clone(),
            });
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn detect_cycles(pipelines: &BTreeMap<String, PipelineConfig>) -> Result<()> {
    fn visit<'a>(
        name: &'a str,
        pipelines: &'a BTreeMap<String, PipelineConfig>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|p| *p == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(name);
                return Err(ConfigError::Cycle {
                    path: cycle.join(" -> "),
                });
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        path.push(name);
        if let Some(pipeline) = pipelines.get(name) {
            for target in pipeline.downstream() {
                visit(target, pipelines, marks, path)?;
            }
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::with_capacity(pipelines.len());
    let mut path = Vec::new();
    for name in pipelines.keys() {
        visit(name, pipelines, &mut marks, &mut path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn parse(toml: &str) -> Result<Config> {
        Config::from_str(toml)
    }

    #[test]
    fn test_valid_minimal_config() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
sinks = [{ type = "stdout" }]
"#;
        assert!(parse(toml).is_ok());
    }

    #[test]
    fn test_no_pipelines() {
        assert!(matches!(parse(""), Err(ConfigError::NoPipelines)));
    }

    #[test]
    fn test_zero_workers() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
workers = 0
sinks = [{ type = "stdout" }]
"#;
        let err = parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "workers", .. }));

        let toml = r#"
[global]
workers = 0

[pipelines.entry]
source = { type = "stdin" }
sinks = [{ type = "stdout" }]
"#;
        assert!(parse(toml).is_err());
    }

    #[test]
    fn test_missing_sinks() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
"#;
        let err = parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "sinks", .. }));
    }

    #[test]
    fn test_duplicate_route() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
routes = [
  { name = "a", condition = "/x" },
  { name = "a", condition = "/y" },
]
sinks = [{ type = "stdout" }]
"#;
        assert!(matches!(parse(toml), Err(ConfigError::DuplicateRoute { .. })));
    }

    #[test]
    fn test_reserved_route_name() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
routes = [{ name = "_default", condition = "/x" }]
sinks = [{ type = "stdout" }]
"#;
        assert!(matches!(parse(toml), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_undeclared_route_subscription() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
routes = [{ name = "a", condition = "/x" }]
sinks = [{ type = "stdout", routes = ["b"] }]
"#;
        let err = parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRoute { ref route, .. } if route == "b"));
    }

    #[test]
    fn test_default_route_subscription_needs_no_declaration() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
routes = [{ name = "a", condition = "/x" }]
sinks = [{ type = "stdout", routes = ["_default"] }]
"#;
        assert!(parse(toml).is_ok());
    }

    #[test]
    fn test_unknown_pipeline() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
sinks = [{ type = "pipeline", pipeline = "missing" }]
"#;
        assert!(matches!(parse(toml), Err(ConfigError::UnknownPipeline { .. })));
    }

    #[test]
    fn test_pipeline_sink_without_target() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
sinks = [{ type = "pipeline" }]
"#;
        let err = parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "pipeline", .. }));
    }

    #[test]
    fn test_orphan_pipeline_source() {
        let toml = r#"
[pipelines.entry]
source = { type = "pipeline" }
sinks = [{ type = "stdout" }]
"#;
        assert!(matches!(parse(toml), Err(ConfigError::OrphanPipelineSource { .. })));
    }

    #[test]
    fn test_forward_into_plugin_sourced_pipeline() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
sinks = [{ type = "pipeline", pipeline = "other" }]

[pipelines.other]
source = { type = "stdin" }
sinks = [{ type = "stdout" }]
"#;
        assert!(matches!(parse(toml), Err(ConfigError::NotPipelineSourced { .. })));
    }

    #[test]
    fn test_cycle_detected() {
        let toml = r#"
[pipelines.entry]
source = { type = "stdin" }
sinks = [{ type = "pipeline", pipeline = "a" }]

[pipelines.a]
source = { type = "pipeline" }
sinks = [{ type = "pipeline", pipeline = "b" }]

[pipelines.b]
source = { type = "pipeline" }
sinks = [{ type = "pipeline", pipeline = "a" }]
"#;
        let err = parse(toml).unwrap_err();
        match err {
            ConfigError::Cycle { path } => assert_eq!(path, "a -> b -> a"),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_fan_in_is_valid() {
        let toml = r#"
[pipelines.one]
source = { type = "stdin" }
sinks = [{ type = "pipeline", pipeline = "merged" }]

[pipelines.two]
source = { type = "stdin" }
sinks = [{ type = "pipeline", pipeline = "merged" }]

[pipelines.merged]
source = { type = "pipeline" }
sinks = [{ type = "null" }]
"#;
        assert!(parse(toml).is_ok());
    }
}
