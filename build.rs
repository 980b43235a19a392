use anyhow::{Context, Result};

fn main() -> Result<()> {
    tonic_build::configure()
        .out_dir("src/criapi")
        .type_attribute("runtime.v1.PortMapping", "#[derive(serde::Serialize)]")
        .type_attribute("runtime.v1.LinuxContainerResources", "#[derive(serde::Serialize)]")
        .compile(&["proto/criapi.proto"], &["proto"])
        .context("compile CRI protocol buffers")
}
