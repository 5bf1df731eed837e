// SPDX-License-Identifier: Apache-2.0
//! The work-queue APIs: a FIFO of skel-encoded work items per wcroot.

use rusqlite::{params, OptionalExtension};

use crate::store::Store;
use crate::{Result, Skel};

pub(crate) fn wq_add_tx(tx: &rusqlite::Transaction<'_>, skel: &Skel) -> Result<()> {
    tx.execute("INSERT INTO work_queue (skel) VALUES (?1)", params![skel.encode()])?;
    Ok(())
}

impl Store {
    /// Enqueue a work item.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn wq_add(&self, skel: &Skel) -> Result<()> {
        self.transact(|tx| wq_add_tx(tx, skel))
    }

    /// Fetch the oldest still-pending work item, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::SkelMalformed`] if the stored item cannot be
    /// parsed (this indicates on-disk corruption, not an empty queue).
    pub fn wq_fetch(&self) -> Result<Option<(i64, Skel)>> {
        let conn = self.conn();
        let row = conn
            .query_row("SELECT id, skel FROM work_queue ORDER BY id LIMIT 1", [], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;
        row.map(|(id, text)| Ok((id, Skel::parse(&text)?))).transpose()
    }

    /// Mark a work item complete, removing it from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] on any underlying database failure.
    pub fn wq_completed(&self, id: i64) -> Result<()> {
        self.conn().execute("DELETE FROM work_queue WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Number of pending work items, for tests and diagnostics.
    pub fn wq_len(&self) -> Result<i64> {
        Ok(self.conn().query_row("SELECT COUNT(*) FROM work_queue", [], |row| row.get(0))?)
    }
}
