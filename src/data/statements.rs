//! Prepared-statement registry
//!
//! Built once at startup and read-only afterwards: every aggregate table is
//! created per rollup level with time-window compaction sized to that level's
//! retention, the work-queue tables with leveled compaction and a short
//! gc_grace, and every statement the writer, reader, and rollup engine need
//! is prepared up front.

use std::collections::HashMap;

use crate::core::config::CentralConfig;
use crate::core::constants::NEEDS_ROLLUP_GC_GRACE_SECONDS;

use super::error::StoreError;
use super::schema::{
    self, ALL_TABLES, AUX_THREAD_PROFILE, LCS, MAIN_THREAD_PROFILE, Table,
};
use super::store::{PreparedStatement, Session};

pub struct StatementCache {
    insert_overall: HashMap<&'static str, Vec<PreparedStatement>>,
    insert_transaction: HashMap<&'static str, Vec<PreparedStatement>>,
    read_overall: HashMap<&'static str, Vec<PreparedStatement>>,
    read_overall_for_rollup: HashMap<&'static str, Vec<PreparedStatement>>,
    read_overall_for_rollup_from_child: HashMap<&'static str, PreparedStatement>,
    read_transaction: HashMap<&'static str, Vec<PreparedStatement>>,
    read_transaction_for_rollup: HashMap<&'static str, Vec<PreparedStatement>>,
    read_transaction_for_rollup_from_child: HashMap<&'static str, PreparedStatement>,

    exists_main_thread_profile_overall: Vec<PreparedStatement>,
    exists_main_thread_profile_transaction: Vec<PreparedStatement>,
    exists_aux_thread_profile_overall: Vec<PreparedStatement>,
    exists_aux_thread_profile_transaction: Vec<PreparedStatement>,

    // index 0 corresponds to rollup level 1
    insert_needs_rollup: Vec<PreparedStatement>,
    read_needs_rollup: Vec<PreparedStatement>,
    delete_needs_rollup: Vec<PreparedStatement>,

    insert_needs_rollup_from_child: PreparedStatement,
    read_needs_rollup_from_child: PreparedStatement,
    delete_needs_rollup_from_child: PreparedStatement,
}

impl StatementCache {
    pub async fn build(
        session: &dyn Session,
        config: &CentralConfig,
    ) -> Result<Self, StoreError> {
        let level_count = config.level_count();
        let expiration_hours = &config.storage.rollup_expiration_hours;

        let mut insert_overall = HashMap::new();
        let mut insert_transaction = HashMap::new();
        let mut read_overall = HashMap::new();
        let mut read_overall_for_rollup = HashMap::new();
        let mut read_overall_for_rollup_from_child = HashMap::new();
        let mut read_transaction = HashMap::new();
        let mut read_transaction_for_rollup = HashMap::new();
        let mut read_transaction_for_rollup_from_child = HashMap::new();

        for table in ALL_TABLES {
            let mut insert_overall_list = Vec::with_capacity(level_count);
            let mut insert_transaction_list = Vec::with_capacity(level_count);
            let mut read_overall_list = Vec::with_capacity(level_count);
            let mut read_overall_for_rollup_list = Vec::with_capacity(level_count);
            let mut read_transaction_list = Vec::with_capacity(level_count);
            let mut read_transaction_for_rollup_list = Vec::with_capacity(level_count);
            for level in 0..level_count {
                let twcs = schema::twcs_options(expiration_hours[level]);
                if table.summary {
                    for transaction in [false, true] {
                        let ddl = schema::create_summary_table_query(table, transaction, level);
                        session
                            .create_table(&format!("{} with {}", ddl, twcs))
                            .await?;
                    }
                    insert_overall_list
                        .push(session.prepare(&schema::insert_summary_ps(table, false, level)).await?);
                    insert_transaction_list
                        .push(session.prepare(&schema::insert_summary_ps(table, true, level)).await?);
                    read_overall_list
                        .push(session.prepare(&schema::read_summary_ps(table, false, level)).await?);
                    read_overall_for_rollup_list.push(
                        session
                            .prepare(&schema::read_summary_for_rollup_ps(table, false, level))
                            .await?,
                    );
                    read_transaction_list
                        .push(session.prepare(&schema::read_summary_ps(table, true, level)).await?);
                    read_transaction_for_rollup_list.push(
                        session
                            .prepare(&schema::read_summary_for_rollup_ps(table, true, level))
                            .await?,
                    );
                } else {
                    for transaction in [false, true] {
                        let ddl = schema::create_table_query(table, transaction, level);
                        session
                            .create_table(&format!("{} with {}", ddl, twcs))
                            .await?;
                    }
                    insert_overall_list
                        .push(session.prepare(&schema::insert_ps(table, false, level)).await?);
                    insert_transaction_list
                        .push(session.prepare(&schema::insert_ps(table, true, level)).await?);
                    read_overall_list
                        .push(session.prepare(&schema::read_ps(table, false, level)).await?);
                    read_overall_for_rollup_list.push(
                        session
                            .prepare(&schema::read_for_rollup_ps(table, false, level))
                            .await?,
                    );
                    read_transaction_list
                        .push(session.prepare(&schema::read_ps(table, true, level)).await?);
                    read_transaction_for_rollup_list.push(
                        session
                            .prepare(&schema::read_for_rollup_ps(table, true, level))
                            .await?,
                    );
                }
            }
            insert_overall.insert(table.partial_name, insert_overall_list);
            insert_transaction.insert(table.partial_name, insert_transaction_list);
            read_overall.insert(table.partial_name, read_overall_list);
            read_overall_for_rollup.insert(table.partial_name, read_overall_for_rollup_list);
            read_transaction.insert(table.partial_name, read_transaction_list);
            read_transaction_for_rollup
                .insert(table.partial_name, read_transaction_for_rollup_list);

            // from-child reads always target the children's level 0
            let (overall_from_child, transaction_from_child) = if table.summary {
                (
                    schema::read_summary_for_rollup_from_child_ps(table, false, 0),
                    schema::read_summary_for_rollup_from_child_ps(table, true, 0),
                )
            } else {
                (
                    schema::read_for_rollup_from_child_ps(table, false, 0),
                    schema::read_for_rollup_from_child_ps(table, true, 0),
                )
            };
            read_overall_for_rollup_from_child
                .insert(table.partial_name, session.prepare(&overall_from_child).await?);
            read_transaction_for_rollup_from_child
                .insert(table.partial_name, session.prepare(&transaction_from_child).await?);
        }

        let mut exists_main_thread_profile_overall = Vec::with_capacity(level_count);
        let mut exists_main_thread_profile_transaction = Vec::with_capacity(level_count);
        let mut exists_aux_thread_profile_overall = Vec::with_capacity(level_count);
        let mut exists_aux_thread_profile_transaction = Vec::with_capacity(level_count);
        for level in 0..level_count {
            exists_main_thread_profile_overall.push(
                session
                    .prepare(&schema::exists_ps(&MAIN_THREAD_PROFILE, false, level))
                    .await?,
            );
            exists_main_thread_profile_transaction.push(
                session
                    .prepare(&schema::exists_ps(&MAIN_THREAD_PROFILE, true, level))
                    .await?,
            );
            exists_aux_thread_profile_overall.push(
                session
                    .prepare(&schema::exists_ps(&AUX_THREAD_PROFILE, false, level))
                    .await?,
            );
            exists_aux_thread_profile_transaction.push(
                session
                    .prepare(&schema::exists_ps(&AUX_THREAD_PROFILE, true, level))
                    .await?,
            );
        }

        // work-queue tables: short gc_grace since resurrected rows only cause
        // extra idempotent work, TTL'd to expire before their source data
        let mut insert_needs_rollup = Vec::with_capacity(level_count - 1);
        let mut read_needs_rollup = Vec::with_capacity(level_count - 1);
        let mut delete_needs_rollup = Vec::with_capacity(level_count - 1);
        for level in 1..level_count {
            session
                .create_table(&format!(
                    "create table if not exists aggregate_needs_rollup_{} \
                     (agent_rollup varchar, capture_time timestamp, uniqueness timeuuid, \
                     transaction_types set<varchar>, \
                     primary key (agent_rollup, capture_time, uniqueness)) \
                     with gc_grace_seconds = {} and {}",
                    level, NEEDS_ROLLUP_GC_GRACE_SECONDS, LCS
                ))
                .await?;
            insert_needs_rollup.push(
                session
                    .prepare(&format!(
                        "insert into aggregate_needs_rollup_{} \
                         (agent_rollup, capture_time, uniqueness, transaction_types) \
                         values (?, ?, ?, ?) using ttl ?",
                        level
                    ))
                    .await?,
            );
            read_needs_rollup.push(
                session
                    .prepare(&format!(
                        "select capture_time, uniqueness, transaction_types \
                         from aggregate_needs_rollup_{} where agent_rollup = ?",
                        level
                    ))
                    .await?,
            );
            delete_needs_rollup.push(
                session
                    .prepare(&format!(
                        "delete from aggregate_needs_rollup_{} where agent_rollup = ? \
                         and capture_time = ? and uniqueness = ?",
                        level
                    ))
                    .await?,
            );
        }

        session
            .create_table(&format!(
                "create table if not exists aggregate_needs_rollup_from_child \
                 (agent_rollup varchar, capture_time timestamp, uniqueness timeuuid, \
                 child_agent_rollup varchar, transaction_types set<varchar>, \
                 primary key (agent_rollup, capture_time, uniqueness)) \
                 with gc_grace_seconds = {} and {}",
                NEEDS_ROLLUP_GC_GRACE_SECONDS, LCS
            ))
            .await?;
        let insert_needs_rollup_from_child = session
            .prepare(
                "insert into aggregate_needs_rollup_from_child \
                 (agent_rollup, capture_time, uniqueness, child_agent_rollup, transaction_types) \
                 values (?, ?, ?, ?, ?) using ttl ?",
            )
            .await?;
        let read_needs_rollup_from_child = session
            .prepare(
                "select capture_time, uniqueness, child_agent_rollup, transaction_types \
                 from aggregate_needs_rollup_from_child where agent_rollup = ?",
            )
            .await?;
        let delete_needs_rollup_from_child = session
            .prepare(
                "delete from aggregate_needs_rollup_from_child where agent_rollup = ? \
                 and capture_time = ? and uniqueness = ?",
            )
            .await?;

        Ok(Self {
            insert_overall,
            insert_transaction,
            read_overall,
            read_overall_for_rollup,
            read_overall_for_rollup_from_child,
            read_transaction,
            read_transaction_for_rollup,
            read_transaction_for_rollup_from_child,
            exists_main_thread_profile_overall,
            exists_main_thread_profile_transaction,
            exists_aux_thread_profile_overall,
            exists_aux_thread_profile_transaction,
            insert_needs_rollup,
            read_needs_rollup,
            delete_needs_rollup,
            insert_needs_rollup_from_child,
            read_needs_rollup_from_child,
            delete_needs_rollup_from_child,
        })
    }

    pub fn insert_overall(&self, table: &Table, level: usize) -> &PreparedStatement {
        &self.insert_overall[table.partial_name][level]
    }

    pub fn insert_transaction(&self, table: &Table, level: usize) -> &PreparedStatement {
        &self.insert_transaction[table.partial_name][level]
    }

    pub fn read_overall(&self, table: &Table, level: usize) -> &PreparedStatement {
        &self.read_overall[table.partial_name][level]
    }

    pub fn read_overall_for_rollup(&self, table: &Table, level: usize) -> &PreparedStatement {
        &self.read_overall_for_rollup[table.partial_name][level]
    }

    pub fn read_overall_for_rollup_from_child(&self, table: &Table) -> &PreparedStatement {
        &self.read_overall_for_rollup_from_child[table.partial_name]
    }

    pub fn read_transaction(&self, table: &Table, level: usize) -> &PreparedStatement {
        &self.read_transaction[table.partial_name][level]
    }

    pub fn read_transaction_for_rollup(&self, table: &Table, level: usize) -> &PreparedStatement {
        &self.read_transaction_for_rollup[table.partial_name][level]
    }

    pub fn read_transaction_for_rollup_from_child(&self, table: &Table) -> &PreparedStatement {
        &self.read_transaction_for_rollup_from_child[table.partial_name]
    }

    pub fn exists_main_thread_profile(
        &self,
        transaction: bool,
        level: usize,
    ) -> &PreparedStatement {
        if transaction {
            &self.exists_main_thread_profile_transaction[level]
        } else {
            &self.exists_main_thread_profile_overall[level]
        }
    }

    pub fn exists_aux_thread_profile(
        &self,
        transaction: bool,
        level: usize,
    ) -> &PreparedStatement {
        if transaction {
            &self.exists_aux_thread_profile_transaction[level]
        } else {
            &self.exists_aux_thread_profile_overall[level]
        }
    }

    /// Insert into `aggregate_needs_rollup_<level>`
    pub fn insert_needs_rollup(&self, level: usize) -> &PreparedStatement {
        &self.insert_needs_rollup[level - 1]
    }

    pub fn read_needs_rollup(&self, level: usize) -> &PreparedStatement {
        &self.read_needs_rollup[level - 1]
    }

    pub fn delete_needs_rollup(&self, level: usize) -> &PreparedStatement {
        &self.delete_needs_rollup[level - 1]
    }

    pub fn insert_needs_rollup_from_child(&self) -> &PreparedStatement {
        &self.insert_needs_rollup_from_child
    }

    pub fn read_needs_rollup_from_child(&self) -> &PreparedStatement {
        &self.read_needs_rollup_from_child
    }

    pub fn delete_needs_rollup_from_child(&self) -> &PreparedStatement {
        &self.delete_needs_rollup_from_child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemorySession;
    use crate::utils::time::ManualClock;

    #[tokio::test]
    async fn test_build_prepares_all_statement_families() {
        let session = MemorySession::new(ManualClock::new(0));
        let config = CentralConfig::default();
        let cache = StatementCache::build(&session, &config).await.unwrap();
        for table in ALL_TABLES {
            for level in 0..config.level_count() {
                cache.insert_overall(table, level);
                cache.read_transaction_for_rollup(table, level);
            }
            cache.read_overall_for_rollup_from_child(table);
        }
        cache.insert_needs_rollup(1);
        cache.delete_needs_rollup(config.level_count() - 1);
        cache.exists_aux_thread_profile(true, 0);
    }
}
