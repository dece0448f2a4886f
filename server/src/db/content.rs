//! Queries against the content and reference tables shared by several
//! operations.

use curator_engine::{
    id_from_value, Occupancy, Record, RecordId, RecordKind, RefCollection, ReferenceRow,
};

use super::{Row, Statement, Tables, Transaction};
use crate::error::Result;

/// Maximum number of ids in one `IN (...)` list.
pub const IN_CHUNK: usize = 500;

/// Read which ids are taken and by which kind.
pub async fn load_occupancy(tx: &mut dyn Transaction, tables: &Tables) -> Result<Occupancy> {
    let mut stmt = Statement::new(tx.dialect());
    stmt.push("SELECT ")
        .push_ident(Record::ID_COLUMN)
        .push(", ")
        .push_ident(Record::KIND_COLUMN)
        .push(" FROM ")
        .push_ident(&tables.contents());

    let rows = stmt.fetch_all(tx).await?;
    let mut occupancy = Occupancy::new();
    for row in &rows {
        let Some(id) = row.get(Record::ID_COLUMN).and_then(id_from_value) else {
            tracing::warn!("Skipping content row without a usable id: {:?}", row);
            continue;
        };
        let kind = row
            .get(Record::KIND_COLUMN)
            .and_then(|v| v.as_str())
            .map(RecordKind::from)
            .unwrap_or_else(|| RecordKind::Other(String::new()));
        occupancy.insert(id, &kind);
    }
    Ok(occupancy)
}

/// Content rows, ascending by id. `None` selects every row.
pub async fn fetch_records(
    tx: &mut dyn Transaction,
    tables: &Tables,
    ids: Option<&[RecordId]>,
) -> Result<Vec<Record>> {
    let rows = match ids {
        None => {
            let mut stmt = Statement::new(tx.dialect());
            stmt.push("SELECT * FROM ")
                .push_ident(&tables.contents())
                .push(" ORDER BY ")
                .push_ident(Record::ID_COLUMN);
            stmt.fetch_all(tx).await?
        }
        Some(ids) => {
            let mut rows = Vec::new();
            for chunk in ids.chunks(IN_CHUNK) {
                let mut stmt = Statement::new(tx.dialect());
                stmt.push("SELECT * FROM ")
                    .push_ident(&tables.contents())
                    .push(" WHERE ")
                    .push_ident(Record::ID_COLUMN)
                    .push(" IN ")
                    .push_bind_list(chunk.iter().copied());
                rows.extend(stmt.fetch_all(tx).await?);
            }
            rows
        }
    };

    let mut records = rows
        .into_iter()
        .map(Record::from_row)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    records.sort_by_key(|r| r.id);
    Ok(records)
}

/// Reference rows of `collection` pointing at any of `record_ids`.
pub async fn fetch_references(
    tx: &mut dyn Transaction,
    tables: &Tables,
    collection: RefCollection,
    record_ids: &[RecordId],
) -> Result<Vec<ReferenceRow>> {
    let table = tables.references(collection);
    let mut references = Vec::new();

    for chunk in record_ids.chunks(IN_CHUNK) {
        let mut stmt = Statement::new(tx.dialect());
        stmt.push("SELECT * FROM ")
            .push_ident(&table)
            .push(" WHERE ")
            .push_ident(RefCollection::RECORD_COLUMN)
            .push(" IN ")
            .push_bind_list(chunk.iter().copied());

        let rows: Vec<Row> = stmt.fetch_all(tx).await?;
        references.extend(rows.into_iter().map(|row| ReferenceRow::new(collection, row)));
    }
    Ok(references)
}

/// Counts of a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deleted {
    pub records: u64,
    pub references: u64,
}

/// Delete records and every reference row pointing at them.
pub async fn delete_records(
    tx: &mut dyn Transaction,
    tables: &Tables,
    ids: &[RecordId],
) -> Result<Deleted> {
    let mut deleted = Deleted::default();

    for chunk in ids.chunks(IN_CHUNK) {
        for collection in RefCollection::ALL {
            let mut stmt = Statement::new(tx.dialect());
            stmt.push("DELETE FROM ")
                .push_ident(&tables.references(collection))
                .push(" WHERE ")
                .push_ident(RefCollection::RECORD_COLUMN)
                .push(" IN ")
                .push_bind_list(chunk.iter().copied());
            deleted.references += stmt.execute(tx).await?;
        }

        let mut stmt = Statement::new(tx.dialect());
        stmt.push("DELETE FROM ")
            .push_ident(&tables.contents())
            .push(" WHERE ")
            .push_ident(Record::ID_COLUMN)
            .push(" IN ")
            .push_bind_list(chunk.iter().copied());
        deleted.records += stmt.execute(tx).await?;
    }

    Ok(deleted)
}

/// `UPDATE table SET column = to WHERE column = from`.
pub async fn rewrite_id(
    tx: &mut dyn Transaction,
    table: &str,
    column: &str,
    from: RecordId,
    to: RecordId,
) -> Result<u64> {
    let mut stmt = Statement::new(tx.dialect());
    stmt.push("UPDATE ")
        .push_ident(table)
        .push(" SET ")
        .push_ident(column)
        .push(" = ")
        .push_bind(to)
        .push(" WHERE ")
        .push_ident(column)
        .push(" = ")
        .push_bind(from);
    Ok(stmt.execute(tx).await?)
}

/// Highest value of an integer column, 0 for an empty table.
pub async fn max_id(tx: &mut dyn Transaction, table: &str, column: &str) -> Result<RecordId> {
    let mut stmt = Statement::new(tx.dialect());
    stmt.push("SELECT MAX(")
        .push_ident(column)
        .push(") AS max_id FROM ")
        .push_ident(table);

    let rows = stmt.fetch_all(tx).await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("max_id"))
        .and_then(id_from_value)
        .unwrap_or(0))
}

/// `SELECT COUNT(*)` with the given `WHERE` clause builder applied.
pub async fn count_where(
    tx: &mut dyn Transaction,
    table: &str,
    conditions: &[(&str, serde_json::Value)],
) -> Result<u64> {
    let mut stmt = Statement::new(tx.dialect());
    stmt.push("SELECT COUNT(*) AS n FROM ").push_ident(table);
    for (index, (column, value)) in conditions.iter().enumerate() {
        stmt.push(if index == 0 { " WHERE " } else { " AND " })
            .push_ident(column)
            .push(" = ")
            .push_bind(value.clone());
    }

    let rows = stmt.fetch_all(tx).await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("n"))
        .and_then(id_from_value)
        .unwrap_or(0) as u64)
}
