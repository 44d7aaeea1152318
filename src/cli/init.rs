use colored::Colorize;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{save_settings, Settings};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = Settings::default();
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    save_settings(&settings)?;

    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(data_dir.join(&settings.provider_dir))?;

    let conn = get_connection(&data_dir.join("penny.db"))?;
    init_db(&conn)?;

    println!("Data dir:  {}", data_dir.display());
    println!("Database:  {}", data_dir.join("penny.db").display());
    println!("{}", "Penny is ready. Try `penny demo` then `penny sync`.".green());
    Ok(())
}
