//! Post-success catalog synchronization.
//!
//! Maps the resolved logical command of a successfully finished statement to
//! catalog mirror calls. Evaluated exactly once per successful run, never
//! for failed or canceled statements. Cross-operation ordering at the mirror
//! is the external store's concern.

use sqlgate_common::{
    CatalogError, CatalogMirror, ColumnDesc, GatewayConfig, ResolvedCommand, SessionId, TableType,
};
use sqlgate_engine::{EngineError, ExecutionEngine};
use thiserror::Error;

use crate::session::ActivePools;

/// Failure of a catalog-sync action. The statement itself has already
/// finished when this surfaces; callers log it and move on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("view schema resolution failed: {0}")]
    Engine(#[from] EngineError),
}

/// Dispatches exactly one catalog-sync action for a recognized
/// schema-changing command; anything else is a no-op.
#[allow(clippy::too_many_arguments)]
pub async fn dispatch(
    command: &ResolvedCommand,
    result_schema: &[ColumnDesc],
    session: SessionId,
    pools: &ActivePools,
    catalog: &dyn CatalogMirror,
    engine: &dyn ExecutionEngine,
    config: &GatewayConfig,
) -> Result<(), SyncError> {
    match command {
        ResolvedCommand::SetConfig { key, value } if *key == config.pool_setting_key => {
            pools.insert(session, value.clone());
            Ok(())
        }
        ResolvedCommand::CreateDatabase { name } => Ok(catalog.register_database(name).await?),
        ResolvedCommand::CreateTable {
            database,
            table,
            columns,
            external,
        } => {
            let db = database.as_deref().unwrap_or(&config.default_database);
            // CREATE TABLE AS SELECT carries no column list; the engine's
            // result schema stands in for it
            let schema = if columns.is_empty() {
                result_schema
            } else {
                columns
            };
            let table_type = if *external {
                TableType::External
            } else {
                TableType::Managed
            };
            Ok(catalog.register_table(db, table, schema, table_type).await?)
        }
        ResolvedCommand::CreateView {
            database,
            view,
            query,
        } => {
            let db = database.as_deref().unwrap_or(&config.default_database);
            let schema = engine.resolve_schema(query).await?;
            Ok(catalog
                .register_table(db, view, &schema, TableType::View)
                .await?)
        }
        ResolvedCommand::CreateFunction { database, name } => {
            let db = database.as_deref().unwrap_or(&config.default_database);
            Ok(catalog.register_function(db, name).await?)
        }
        ResolvedCommand::DropDatabase { name } => Ok(catalog.refresh_databases(name).await?),
        ResolvedCommand::DropTable { database, .. } => {
            let db = database.as_deref().unwrap_or(&config.default_database);
            Ok(catalog.refresh_tables(db).await?)
        }
        ResolvedCommand::DropFunction { database, .. } => {
            let db = database.as_deref().unwrap_or(&config.default_database);
            Ok(catalog.refresh_functions(db).await?)
        }
        ResolvedCommand::SetConfig { .. } | ResolvedCommand::Other => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use parking_lot::Mutex;
    use sqlgate_engine::MockEngine;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        RegisterDatabase(String),
        RegisterTable(String, String, Vec<ColumnDesc>, TableType),
        RegisterFunction(String, String),
        RefreshDatabases(String),
        RefreshTables(String),
        RefreshFunctions(String),
    }

    #[derive(Default)]
    struct RecordingCatalog {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingCatalog {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CatalogMirror for RecordingCatalog {
        async fn register_database(&self, name: &str) -> Result<(), CatalogError> {
            self.calls.lock().push(Call::RegisterDatabase(name.into()));
            Ok(())
        }
        async fn register_table(
            &self,
            database: &str,
            table: &str,
            schema: &[ColumnDesc],
            table_type: TableType,
        ) -> Result<(), CatalogError> {
            self.calls.lock().push(Call::RegisterTable(
                database.into(),
                table.into(),
                schema.to_vec(),
                table_type,
            ));
            Ok(())
        }
        async fn register_function(&self, database: &str, name: &str) -> Result<(), CatalogError> {
            self.calls
                .lock()
                .push(Call::RegisterFunction(database.into(), name.into()));
            Ok(())
        }
        async fn refresh_databases(&self, database: &str) -> Result<(), CatalogError> {
            self.calls.lock().push(Call::RefreshDatabases(database.into()));
            Ok(())
        }
        async fn refresh_tables(&self, database: &str) -> Result<(), CatalogError> {
            self.calls.lock().push(Call::RefreshTables(database.into()));
            Ok(())
        }
        async fn refresh_functions(&self, database: &str) -> Result<(), CatalogError> {
            self.calls.lock().push(Call::RefreshFunctions(database.into()));
            Ok(())
        }
    }

    async fn run_dispatch(
        command: &ResolvedCommand,
        result_schema: &[ColumnDesc],
        pools: &ActivePools,
        catalog: &RecordingCatalog,
        engine: &MockEngine,
    ) {
        dispatch(
            command,
            result_schema,
            1,
            pools,
            catalog,
            engine,
            &GatewayConfig::default(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn pool_setting_updates_only_the_sessions_entry() {
        let pools: ActivePools = Arc::new(DashMap::new());
        let catalog = RecordingCatalog::default();
        let engine = MockEngine::new();

        let command = ResolvedCommand::SetConfig {
            key: "scheduler.pool".into(),
            value: "etl".into(),
        };
        run_dispatch(&command, &[], &pools, &catalog, &engine).await;

        assert_eq!(pools.get(&1).map(|e| e.value().clone()), Some("etl".into()));
        assert!(pools.get(&2).is_none());
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn unrelated_set_is_a_noop() {
        let pools: ActivePools = Arc::new(DashMap::new());
        let catalog = RecordingCatalog::default();
        let engine = MockEngine::new();

        let command = ResolvedCommand::SetConfig {
            key: "exec.parallelism".into(),
            value: "8".into(),
        };
        run_dispatch(&command, &[], &pools, &catalog, &engine).await;

        assert!(pools.is_empty());
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn create_table_defaults_the_database() {
        let pools: ActivePools = Arc::new(DashMap::new());
        let catalog = RecordingCatalog::default();
        let engine = MockEngine::new();

        let columns = vec![ColumnDesc::new("id", "INT")];
        let command = ResolvedCommand::CreateTable {
            database: None,
            table: "t".into(),
            columns: columns.clone(),
            external: false,
        };
        run_dispatch(&command, &[], &pools, &catalog, &engine).await;

        assert_eq!(
            catalog.calls(),
            vec![Call::RegisterTable(
                "default".into(),
                "t".into(),
                columns,
                TableType::Managed
            )]
        );
    }

    #[tokio::test]
    async fn ctas_uses_the_result_schema() {
        let pools: ActivePools = Arc::new(DashMap::new());
        let catalog = RecordingCatalog::default();
        let engine = MockEngine::new();

        let result_schema = vec![ColumnDesc::new("id", "INT"), ColumnDesc::new("name", "STRING")];
        let command = ResolvedCommand::CreateTable {
            database: Some("sales".into()),
            table: "copy".into(),
            columns: vec![],
            external: false,
        };
        run_dispatch(&command, &result_schema, &pools, &catalog, &engine).await;

        assert_eq!(
            catalog.calls(),
            vec![Call::RegisterTable(
                "sales".into(),
                "copy".into(),
                result_schema,
                TableType::Managed
            )]
        );
    }

    #[tokio::test]
    async fn create_view_reresolves_the_defining_query() {
        let pools: ActivePools = Arc::new(DashMap::new());
        let catalog = RecordingCatalog::default();
        let engine = MockEngine::new();
        let schema = vec![ColumnDesc::new("id", "INT")];
        engine.script_view_schema("SELECT id FROM t", schema.clone());

        let command = ResolvedCommand::CreateView {
            database: None,
            view: "v".into(),
            query: "SELECT id FROM t".into(),
        };
        run_dispatch(&command, &[], &pools, &catalog, &engine).await;

        assert_eq!(
            catalog.calls(),
            vec![Call::RegisterTable(
                "default".into(),
                "v".into(),
                schema,
                TableType::View
            )]
        );
    }

    #[tokio::test]
    async fn drops_refresh_the_right_namespace() {
        let pools: ActivePools = Arc::new(DashMap::new());
        let catalog = RecordingCatalog::default();
        let engine = MockEngine::new();

        run_dispatch(
            &ResolvedCommand::DropDatabase { name: "d".into() },
            &[],
            &pools,
            &catalog,
            &engine,
        )
        .await;
        run_dispatch(
            &ResolvedCommand::DropTable {
                database: Some("sales".into()),
                table: "t".into(),
            },
            &[],
            &pools,
            &catalog,
            &engine,
        )
        .await;
        run_dispatch(
            &ResolvedCommand::DropFunction {
                database: None,
                name: "f".into(),
            },
            &[],
            &pools,
            &catalog,
            &engine,
        )
        .await;

        assert_eq!(
            catalog.calls(),
            vec![
                Call::RefreshDatabases("d".into()),
                Call::RefreshTables("sales".into()),
                Call::RefreshFunctions("default".into()),
            ]
        );
    }

    #[tokio::test]
    async fn other_commands_are_noops() {
        let pools: ActivePools = Arc::new(DashMap::new());
        let catalog = RecordingCatalog::default();
        let engine = MockEngine::new();

        run_dispatch(&ResolvedCommand::Other, &[], &pools, &catalog, &engine).await;

        assert!(catalog.calls().is_empty());
        assert!(pools.is_empty());
    }
}
