use errkb::config::{find_kb_path, global_config_file, setting_info, KbConfig, SETTINGS};
use errkb::{KbError, Result};

/// Run the config command
pub fn run_config(key: Option<&str>, value: Option<&str>, global: bool, list: bool) -> Result<()> {
    if list {
        print_settings();
        return Ok(());
    }

    let mut config = match find_kb_path() {
        Some(kb_path) => KbConfig::load(&kb_path)?,
        None if global => KbConfig::load_global(global_config_file())?,
        None => return Err(KbError::NotInitialized),
    };

    match (key, value) {
        (None, None) => {
            println!("Current configuration:\n");
            for info in SETTINGS {
                if let Some((v, source)) = config.resolve(info.key) {
                    println!("  {:22} {:8} ({})", info.key, v, source);
                }
            }
        }
        (Some(k), None) => {
            if setting_info(k).is_none() {
                return Err(KbError::InvalidSetting {
                    key: k.to_string(),
                    reason: "unknown setting".to_string(),
                });
            }
            match config.resolve(k) {
                Some((v, source)) => println!("{}: {} ({})", k, v, source),
                None => println!("{}: (not set)", k),
            }
        }
        (Some(k), Some(v)) => {
            let file = if global {
                config.global_mut()
            } else {
                config.project_mut().ok_or(KbError::NotInitialized)?
            };
            file.set(k, v)?;
            println!("Set {} = {} in {}", k, v, file.path().display());
        }
        (None, Some(_)) => {
            return Err(KbError::InvalidSetting {
                key: String::new(),
                reason: "key required when setting a value".to_string(),
            });
        }
    }

    Ok(())
}

fn print_settings() {
    println!("Available settings:\n");
    println!("{:22} {:8} {}", "Key", "Default", "Description");
    println!("{}", "-".repeat(72));

    for info in SETTINGS {
        println!("{:22} {:8} {}", info.key, info.default, info.description);
    }

    println!("\nSet with: errkb config <key> <value> [--global]");
}
