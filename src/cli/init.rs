use rentbook::classifier::ensure_default_categories;
use rentbook::error::{RentbookError, Result};
use rentbook::settings::{load_settings, save_settings, settings_path, shellexpand_path};
use rentbook::store::{self, StorageKind};

pub fn run(data_dir: Option<String>, storage: Option<String>) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(kind) = storage {
        settings.storage = match kind.trim().to_ascii_lowercase().as_str() {
            "sqlite" => StorageKind::Sqlite,
            "memory" => StorageKind::Memory,
            other => {
                return Err(RentbookError::Validation(format!(
                    "unknown storage '{other}', expected sqlite or memory"
                )))
            }
        };
    }

    let data_path = settings.data_path();
    std::fs::create_dir_all(&data_path)?;
    save_settings(&settings)?;

    let store = store::open(settings.storage, &data_path)?;
    let categories = ensure_default_categories(store.as_ref(), settings.user_id)?;

    println!("Settings:   {}", settings_path().display());
    println!("Data dir:   {}", data_path.display());
    match settings.storage {
        StorageKind::Sqlite => println!("Database:   {}", data_path.join("rentbook.db").display()),
        StorageKind::Memory => println!("Database:   (in memory, nothing is kept between runs)"),
    }
    println!("Categories: {}", categories.len());
    Ok(())
}
