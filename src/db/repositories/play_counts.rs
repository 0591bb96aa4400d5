use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{
    helpers::{to_i64, to_u32},
    Database,
};
use crate::rotation::{Ledger, LedgerEntry, LedgerStore};

fn row_to_entry(row: &Row) -> Result<LedgerEntry> {
    let idx: i64 = row.get("idx")?;
    let play_count: i64 = row.get("play_count")?;

    Ok(LedgerEntry {
        index: to_u32(idx, "idx")?,
        track_id: row.get("track_id")?,
        play_count: to_u32(play_count, "play_count")?,
    })
}

impl LedgerStore for Database {
    fn read(&self, level: &str) -> Result<Vec<LedgerEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT idx, track_id, play_count
                 FROM play_counts
                 WHERE level_label = ?1
                 ORDER BY idx ASC",
            )?;

            let mut rows = stmt.query(params![level])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
    }

    /// Replace the level's rows in one transaction so a failed write leaves the old counts.
    fn save(&self, ledger: &Ledger) -> Result<()> {
        self.execute(|conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn
                .transaction()
                .context("failed to open play-count transaction")?;

            tx.execute(
                "DELETE FROM play_counts WHERE level_label = ?1",
                params![ledger.level()],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO play_counts (level_label, idx, track_id, play_count, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for entry in ledger.entries() {
                    stmt.execute(params![
                        ledger.level(),
                        to_i64(entry.index),
                        entry.track_id,
                        to_i64(entry.play_count),
                        now,
                    ])?;
                }
            }

            tx.commit().context("failed to commit play counts")?;
            Ok(())
        })
    }

    fn levels(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT level_label FROM play_counts ORDER BY level_label ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut levels = Vec::new();
            while let Some(row) = rows.next()? {
                levels.push(row.get(0)?);
            }
            Ok(levels)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pool(tracks: &[&str]) -> Vec<String> {
        tracks.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn save_replaces_previous_rows() {
        let db = Database::open_in_memory().unwrap();

        let mut ledger = Ledger::load(&db, "focus", &pool(&["a.mp3", "b.mp3"])).unwrap();
        ledger.increment("b.mp3").unwrap();
        db.save(&ledger).unwrap();

        let shrunk = Ledger::load(&db, "focus", &pool(&["b.mp3"])).unwrap();
        assert_eq!(shrunk.entries(), &[LedgerEntry::new(0, "b.mp3", 1)]);
        assert_eq!(db.read("focus").unwrap(), shrunk.entries().to_vec());
    }

    #[test]
    fn levels_are_kept_apart() {
        let db = Database::open_in_memory().unwrap();
        Ledger::load(&db, "warmup", &pool(&["a.mp3"])).unwrap();
        Ledger::load(&db, "focus", &pool(&["x.mp3", "y.mp3"])).unwrap();

        assert_eq!(db.read("warmup").unwrap().len(), 1);
        assert_eq!(db.read("focus").unwrap().len(), 2);
        assert_eq!(
            db.levels().unwrap(),
            vec!["focus".to_string(), "warmup".to_string()]
        );
    }

    #[test]
    fn counts_survive_reopening_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data/studyquest.sqlite3");

        {
            let db = Database::open(path.clone()).unwrap();
            let mut ledger = Ledger::load(&db, "focus", &pool(&["a.mp3"])).unwrap();
            ledger.increment("a.mp3").unwrap();
            db.save(&ledger).unwrap();
        }

        let db = Database::open(path).unwrap();
        assert_eq!(db.read("focus").unwrap(), vec![LedgerEntry::new(0, "a.mp3", 1)]);
    }
}
