//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use mnemograph::config::MnemographConfig;
use mnemograph::db;
use mnemograph::embedding::Embedder;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &MnemographConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `mnemograph serve` or `mnemograph remember` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = match db::open_database(&db_path) {
        Ok(conn) => conn,
        Err(e) if db::is_corruption(&e) => {
            println!("Database: CORRUPT ({e:#})");
            println!();
            println!("Recovery steps:");
            println!("  1. Start the server (storage.auto_recover = true moves the file aside");
            println!("     and starts on an empty store), or restore a backup.");
            println!("  2. Re-ingest: mnemograph import notes.txt");
            println!("     or, from an earlier export: mnemograph import --from-export backup.json");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to open database"),
    };

    let report = db::check_database_health(&conn).context("failed to run health check")?;
    let configured = Embedder::from_config(&config.embedding);

    println!("Mnemograph Health Report");
    println!("========================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!();
    println!("Embedding model:");
    println!("  Stored:          {}", report.embedding_model.as_deref().unwrap_or("(not set)"));
    println!("  Configured:      {}", configured.model_id());
    match &report.embedding_model {
        Some(stored) if stored != configured.model_id() => {
            println!("  WARNING: model mismatch; older vectors are not comparable with new ones.");
        }
        Some(_) => println!("  Status:          OK (match)"),
        None => {}
    }
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", report.memory_count);
    println!("  Edges:           {}", report.edge_count);
    println!("  Audit log:       {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Export what is readable: mnemograph export --output backup.json");
        println!("  2. Move the database aside and re-import:");
        println!("     mnemograph import --from-export backup.json");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
