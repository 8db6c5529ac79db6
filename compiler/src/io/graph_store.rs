//! Compiled graph output.

use std::path::Path;

use anyhow::{Context, Result};

use crate::io::config::write_atomic;
use crate::job::JobGraph;

/// Pretty-printed JSON with a trailing newline; jobs keep insertion order.
pub fn render_graph(graph: &JobGraph) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(graph).context("serialize job graph")?;
    buf.push('\n');
    Ok(buf)
}

/// Atomically write the compiled graph to disk.
pub fn write_graph(path: &Path, graph: &JobGraph) -> Result<()> {
    let buf = render_graph(graph)?;
    write_atomic(path, &buf).with_context(|| format!("write graph {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use serde_json::Value;

    #[test]
    fn writes_jobs_in_insertion_order() {
        let mut graph = JobGraph::new();
        graph.add_job(Job::new("zeta", "ubuntu-latest")).expect("add");
        let mut alpha = Job::new("alpha", "ubuntu-latest");
        alpha.add_need("zeta");
        graph.add_job(alpha).expect("add");

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("graph.json");
        write_graph(&path, &graph).expect("write");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert!(contents.ends_with("}\n"));
        assert!(contents.find("\"zeta\"") < contents.find("\"alpha\""));
        let value: Value = serde_json::from_str(&contents).expect("json");
        assert_eq!(value["alpha"]["needs"][0], "zeta");
        assert_eq!(value["zeta"]["runs-on"], "ubuntu-latest");
    }
}
