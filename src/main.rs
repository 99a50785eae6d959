use orbit_viewer::{ViewerConfig, run};

fn main() -> anyhow::Result<()> {
    run(ViewerConfig::default())
}
