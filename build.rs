use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")?;
    let root = Path::new(&manifest_dir);

    // Fixture roots for the chart and module suites
    let charts_dir = root.join("infrastructure").join("helm").join("charts");
    let terraform_dir = root.join("infrastructure").join("terraform");

    println!("cargo:rustc-env=FX_CHARTS_DIR={}", charts_dir.display());
    println!("cargo:rustc-env=FX_TERRAFORM_DIR={}", terraform_dir.display());
    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
