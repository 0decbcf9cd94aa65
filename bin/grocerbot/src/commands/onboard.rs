use grocerbot_core::{Config, Paths};
use std::io::{self, Write};

const PROMPT_TXT: &str = r#"You turn grocery requests into JSON.

Reply with a single JSON object and nothing else:

{
  "add": [{"name": "<product>", "count": <number or "MIN">, "unit": "<unit>"}],
  "remove": ["<product>"]
}

Rules:
- "add" lists what the user wants to buy. Use "MIN" when no amount is given.
- "remove" lists what the user wants taken out of the cart.
- Keep product names short and in the user's language.
- The current cart contents follow the request; use them to resolve removals.
"#;

const CATALOG_YAML: &str = r#"# Phrases users type (aliases) and the goods they stand for,
# highest priority first.
products:
  - aliases: ["молоко", "Молоко 2.5% 1л"]
    specificProducts: ["Молоко Простоквашино 2.5% 930мл", "Молоко Домик в деревне 2.5%"]
  - aliases: ["сыр"]
    specificProducts: ["Сыр Российский 200г"]
  - aliases: ["хлеб", "батон"]
    specificProducts: ["Батон нарезной 400г"]
"#;

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();

    if paths.config_file().exists() && !force {
        print!("Config already exists. Overwrite? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    paths.ensure_dirs()?;

    Config::default().save(&paths.config_file())?;
    println!("✓ Created config: {}", paths.config_file().display());

    write_if_not_exists(&paths.catalog_file(), CATALOG_YAML)?;
    write_if_not_exists(&paths.prompt_file(), PROMPT_TXT)?;

    println!();
    println!("Next steps:");
    println!("  1. Set BOT_TOKEN and PHONE_NUMBER, or edit {}", paths.config_file().display());
    println!("  2. Fill in {}", paths.catalog_file().display());
    println!("  3. Run `grocerbot status` to verify configuration");
    println!("  4. Run `grocerbot run` to start the bot");

    Ok(())
}

fn write_if_not_exists(path: &std::path::Path, content: &str) -> io::Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        println!("  ✓ Created {}", path.display());
    }
    Ok(())
}
