//! 目录数据库维护语句

use super::query::{SqlCommand, SqlValue};
use std::path::Path;

/// 数据库总大小（GB）
pub fn database_size_gb() -> SqlCommand {
    SqlCommand::new(
        "SELECT CAST(SUM(CAST(size AS bigint)) * 8.0 / 1024 / 1024 AS decimal(18,3)) \
         FROM sys.database_files",
    )
}

/// 已拒绝更新的本地 ID
pub fn declined_update_ids() -> SqlCommand {
    SqlCommand::new(
        "SELECT u.LocalUpdateID FROM dbo.tbUpdate AS u \
         INNER JOIN PUBLIC_VIEWS.vUpdate AS pu ON u.UpdateID = pu.UpdateId \
         WHERE pu.IsDeclined = 1 ORDER BY u.LocalUpdateID",
    )
}

/// 通过官方存储过程删除单条更新
pub fn delete_update(local_update_id: i64, timeout_secs: u64) -> SqlCommand {
    SqlCommand::new("EXEC dbo.spDeleteUpdate @localUpdateID = $(LocalUpdateId)")
        .bind("LocalUpdateId", SqlValue::Int(local_update_id))
        .timeout_secs(timeout_secs)
}

/// 删除已拒绝更新的取代关系（单轮限制行数），返回本轮删除行数
pub fn remove_declined_supersession(row_limit: u32) -> SqlCommand {
    SqlCommand::new(
        "DELETE TOP ($(RowLimit)) FROM dbo.tbRevisionSupersedesUpdate \
         WHERE SupersededUpdateID IN \
         (SELECT UpdateID FROM PUBLIC_VIEWS.vUpdate WHERE IsDeclined = 1); \
         SELECT @@ROWCOUNT",
    )
    .bind("RowLimit", SqlValue::Int(i64::from(row_limit)))
}

/// 删除由过期修订持有的取代关系（单轮限制行数），返回本轮删除行数
pub fn remove_superseded_supersession(row_limit: u32) -> SqlCommand {
    SqlCommand::new(
        "DELETE TOP ($(RowLimit)) rsu FROM dbo.tbRevisionSupersedesUpdate AS rsu \
         INNER JOIN dbo.tbRevision AS r ON rsu.RevisionID = r.RevisionID \
         WHERE r.IsLatestRevision = 0; \
         SELECT @@ROWCOUNT",
    )
    .bind("RowLimit", SqlValue::Int(i64::from(row_limit)))
}

/// 碎片率高于阈值的索引：schema|table|index|fragmentation
pub fn fragmented_indexes(min_fragmentation: f64, min_pages: u32) -> SqlCommand {
    SqlCommand::new(
        "SELECT s.name, t.name, i.name, ps.avg_fragmentation_in_percent \
         FROM sys.dm_db_index_physical_stats(DB_ID(), NULL, NULL, NULL, 'LIMITED') AS ps \
         INNER JOIN sys.indexes AS i ON ps.object_id = i.object_id AND ps.index_id = i.index_id \
         INNER JOIN sys.tables AS t ON i.object_id = t.object_id \
         INNER JOIN sys.schemas AS s ON t.schema_id = s.schema_id \
         WHERE i.name IS NOT NULL \
           AND ps.avg_fragmentation_in_percent > $(MinFragmentation) \
           AND ps.page_count > $(MinPages) \
         ORDER BY ps.avg_fragmentation_in_percent DESC",
    )
    .bind("MinFragmentation", SqlValue::Float(min_fragmentation))
    .bind("MinPages", SqlValue::Int(i64::from(min_pages)))
}

pub fn rebuild_index(schema: &str, table: &str, index: &str) -> SqlCommand {
    SqlCommand::new("ALTER INDEX $(Index) ON $(Schema).$(Table) REBUILD")
        .bind("Index", SqlValue::Ident(index.to_string()))
        .bind("Schema", SqlValue::Ident(schema.to_string()))
        .bind("Table", SqlValue::Ident(table.to_string()))
        .unbounded()
}

pub fn reorganize_index(schema: &str, table: &str, index: &str) -> SqlCommand {
    SqlCommand::new("ALTER INDEX $(Index) ON $(Schema).$(Table) REORGANIZE")
        .bind("Index", SqlValue::Ident(index.to_string()))
        .bind("Schema", SqlValue::Ident(schema.to_string()))
        .bind("Table", SqlValue::Ident(table.to_string()))
        .unbounded()
}

pub fn update_statistics() -> SqlCommand {
    SqlCommand::new("EXEC sp_updatestats").unbounded()
}

/// 数据文件中可回收的空闲空间（MB）
pub fn reclaimable_space_mb() -> SqlCommand {
    SqlCommand::new(
        "SELECT CAST(SUM(CAST(size AS bigint) - CAST(FILEPROPERTY(name, 'SpaceUsed') AS bigint)) \
         * 8.0 / 1024 AS decimal(18,2)) FROM sys.database_files WHERE type = 0",
    )
}

pub fn shrink_database(database: &str) -> SqlCommand {
    SqlCommand::new("DBCC SHRINKDATABASE ($(Database), 10) WITH NO_INFOMSGS")
        .bind("Database", SqlValue::Ident(database.to_string()))
        .unbounded()
}

/// 完整备份，不设超时
pub fn backup_database(database: &str, target: &Path) -> SqlCommand {
    SqlCommand::new(
        "BACKUP DATABASE $(Database) TO DISK = $(BackupPath) WITH INIT, CHECKSUM, STATS = 10",
    )
    .bind("Database", SqlValue::Ident(database.to_string()))
    .bind(
        "BackupPath",
        SqlValue::Text(target.to_string_lossy().into_owned()),
    )
    .unbounded()
}
