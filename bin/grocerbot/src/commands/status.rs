use grocerbot_channels::ChannelManager;
use grocerbot_core::{Catalog, Config, Paths};

fn mark(exists: bool) -> &'static str {
    if exists {
        "✓"
    } else {
        "✗ (not found)"
    }
}

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("grocerbot status");
    println!("================");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!("Config:    {} {}", config_path.display(), mark(config_exists));

    if !config_exists {
        println!();
        println!("Run `grocerbot onboard` to initialize.");
        return Ok(());
    }

    let config = Config::load_or_default(&paths)?;

    let catalog_path = config.catalog_path(&paths);
    println!("Catalog:   {} {}", catalog_path.display(), mark(catalog_path.exists()));
    if catalog_path.exists() {
        match Catalog::load(&catalog_path) {
            Ok(catalog) => println!("           {} products", catalog.products.len()),
            Err(e) => println!("           ⚠ unreadable: {}", e),
        }
    }
    let prompt_path = config.prompt_path(&paths);
    println!("Prompt:    {} {}", prompt_path.display(), mark(prompt_path.exists()));
    println!(
        "Login:     {}",
        if paths.has_auth_state() {
            "✓ saved session"
        } else {
            "✗ not logged in"
        }
    );
    println!();

    println!("Model:     {} @ {}", config.providers.ollama.model, config.providers.ollama.api_base);
    println!("Shop:      {}", config.shop.base_url);
    println!(
        "Phone:     {}",
        if config.shop.phone_number.is_empty() {
            "✗ not set"
        } else {
            "✓ set"
        }
    );
    println!();

    println!("Channels:");
    for (name, active, detail) in ChannelManager::new(config).get_status() {
        println!("  {:<10} {} {}", name, if active { "✓" } else { "✗" }, detail);
    }

    Ok(())
}
