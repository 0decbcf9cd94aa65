use super::{build_resolver, load};

/// One-off resolution against an empty cart, for checking prompt and catalog.
pub async fn run(text: &str) -> anyhow::Result<()> {
    let (paths, config) = load()?;
    let resolver = build_resolver(&paths, &config);
    if resolver.catalog().is_empty() {
        println!("⚠ Catalog is empty, no suggestions will be made");
    }

    let resolution = resolver.resolve(text, &[]).await?;
    for message in resolution.messages() {
        println!("{}", message);
        println!();
    }
    Ok(())
}
