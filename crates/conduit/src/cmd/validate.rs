//! Validate command - check a configuration and print its pipelines

use std::path::Path;

use anyhow::{Context, Result};
use conduit_config::Config;
use conduit_pipeline::{PipelineGraph, PluginRegistries};

/// Validate the configuration at `path`
///
/// Building the graph also checks plugin types and their options, which
/// parsing alone does not.
pub fn run(path: &Path) -> Result<()> {
    let config = Config::from_file(path).context("invalid configuration")?;
    let graph = PipelineGraph::from_config(&config, &PluginRegistries::with_defaults())
        .context("invalid pipelines")?;

    println!("{}: {} pipeline(s) ok", path.display(), graph.pipelines().len());
    for name in graph.start_order() {
        println!("  {}", describe(&config, name));
    }
    Ok(())
}

fn describe(config: &Config, name: &str) -> String {
    let Some(p) = config.pipelines.get(name) else {
        return name.to_string();
    };
    let processors: Vec<&str> = p.processors.iter().map(|p| p.plugin_type.as_str()).collect();
    let sinks: Vec<String> = p
        .sinks
        .iter()
        .enumerate()
        .map(|(i, s)| s.display_name(i))
        .collect();
    format!(
        "{name}: {} -> [{}] -> [{}] (workers {})",
        p.source.plugin_type,
        processors.join(", "),
        sinks.join(", "),
        config.workers_for(p),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let config: Config = r#"
            [global]
            workers = 2

            [pipelines.main]
            source = { type = "stdin" }
            processors = [{ type = "noop" }]
            sinks = [{ type = "pipeline", pipeline = "out" }]

            [pipelines.out]
            source = { type = "pipeline" }
            sinks = [{ type = "stdout", name = "console" }]
        "#
        .parse()
        .unwrap();

        assert_eq!(
            describe(&config, "main"),
            "main: stdin -> [noop] -> [pipeline:out] (workers 2)"
        );
        assert_eq!(
            describe(&config, "out"),
            "out: pipeline -> [] -> [console] (workers 2)"
        );
    }
}
