use std::sync::Arc;

use gridbase_core::{ColumnType, ManualClock, OwnerId, RowKey, TableDetail, TableId};
use gridbase_engine::{
    CellEdit, CellSource, CellWrite, EngineConfig, EngineError, TableSession, TransportError,
    TransportErrorKind,
};
use gridbase_harness::{LocalTransport, ResponseGate, TestServer, init_tracing};
use gridbase_storage::{Storage, TableSkeleton};

struct Fixture {
    server: TestServer,
    owner: OwnerId,
    table: TableDetail,
    transport: LocalTransport,
    gate: Arc<ResponseGate>,
    session: TableSession,
}

impl Fixture {
    async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        init_tracing("gridbase=debug");
        let server = TestServer::new()?;
        let (owner, table) = server.seed_table("Customers", TableSkeleton::Default)?;
        let gate = Arc::new(ResponseGate::new());
        let transport = server.gated_transport(owner, gate.clone());
        let session = TableSession::open(
            Arc::new(transport.clone()),
            table.table.table_id,
            EngineConfig::default(),
            Arc::new(ManualClock::new(1_000)),
        )
        .await?;
        Ok(Self {
            server,
            owner,
            table,
            transport,
            gate,
            session,
        })
    }

    fn server_value(
        &self,
        row: gridbase_core::RowId,
        column: gridbase_core::ColumnId,
    ) -> Option<String> {
        let detail = self
            .server
            .with_storage(|s| s.get_table(self.owner, self.table.table.table_id))
            .ok()?;
        detail
            .rows
            .iter()
            .find(|r| r.row_id == row)
            .and_then(|r| r.cell_value(column))
            .map(str::to_string)
    }
}

// ============================================================================
// Opening
// ============================================================================

#[tokio::test]
async fn open_loads_columns_and_first_page() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    assert_eq!(fx.session.columns(), fx.table.columns);
    assert_eq!(fx.session.len(), 3);
    let view = fx.session.view(None);
    assert!(view.iter().all(|r| !r.is_speculative()));
    assert!(view.windows(2).all(|w| w[0].position < w[1].position));
    Ok(())
}

#[tokio::test]
async fn open_distinguishes_forbidden_from_missing() -> Result<(), Box<dyn std::error::Error>> {
    let server = TestServer::new()?;
    let (_, table) = server.seed_table("Private", TableSkeleton::Default)?;
    let clock = Arc::new(ManualClock::new(0));

    let stranger = Arc::new(server.transport(OwnerId::new()));
    let table_id = table.table.table_id;
    let err = TableSession::open(stranger, table_id, EngineConfig::default(), clock.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Transport(TransportError::Forbidden(_))), "{err}");

    let (owner, _) = server.seed_table("Other", TableSkeleton::Empty)?;
    let err = TableSession::open(
        Arc::new(server.transport(owner)),
        TableId::new(),
        EngineConfig::default(),
        clock,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Transport(TransportError::NotFound(_))), "{err}");
    Ok(())
}

#[tokio::test]
async fn reload_picks_up_columns_and_rows_added_elsewhere(
) -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let table_id = fx.table.table.table_id;
    let first = fx.table.rows[0].row_id;
    let name = fx.table.columns[0].column_id;

    let phone = fx.server.with_storage(|s| -> Result<_, gridbase_storage::StorageError> {
        let phone = s.create_column(fx.owner, table_id, "Phone", Some(ColumnType::Text))?;
        s.create_row(fx.owner, table_id)?;
        s.upsert_cell(fx.owner, first, name, "remote")?;
        Ok(phone)
    })?;

    assert_eq!(fx.session.reload().await?, 1);
    assert_eq!(fx.transport.call_count("get_table"), 1);
    assert!(fx.session.columns().iter().any(|c| c.column_id == phone.column_id));
    assert_eq!(fx.session.len(), 4);

    let view = fx.session.view(None);
    let row = view.iter().find(|r| r.real_id == Some(first)).ok_or("row missing")?;
    assert_eq!(row.value(name), Some("remote"));
    assert_eq!(row.value(phone.column_id), Some(""));
    Ok(())
}

// ============================================================================
// Merge precedence
// ============================================================================

#[tokio::test]
async fn pending_write_masks_stale_server_value() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let row = fx.table.rows[0].row_id;
    let name = fx.table.columns[0].column_id;
    fx.server
        .with_storage(|s| s.upsert_cell(fx.owner, row, name, "A"))?;
    fx.session.refresh().await?;
    assert_eq!(fx.session.view(None)[0].value(name), Some("A"));

    fx.gate.hold();
    let session = fx.session.clone();
    let write =
        tokio::spawn(async move { session.update_cell(&RowKey::Real(row), name, "B").await });
    fx.gate.wait_for_parked(1).await;

    // A read carrying the old value arrives while the write is in flight.
    let mut stale = fx.table.rows[0].clone();
    for cell in &mut stale.cells {
        if cell.column_id == name {
            cell.value = Some("A".into());
        }
    }
    fx.session.dispatch(gridbase_engine::store::IngestRows {
        rows: vec![stale],
        fence: None,
    });

    let view = fx.session.view(None);
    let cell = view[0].cell(name).ok_or("missing cell")?;
    assert_eq!(cell.value, "B");
    assert_eq!(cell.source, CellSource::Pending);
    let json = serde_json::to_value(&view[0])?;
    assert_eq!(json["cells"][0]["source"], "Pending");

    fx.gate.open();
    let outcome = write.await??;
    assert!(matches!(outcome, CellWrite::Confirmed(ref c) if c.value.as_deref() == Some("B")));
    assert_eq!(fx.session.view(None)[0].value(name), Some("B"));
    assert!(fx.session.with_store(|s| s.ledger().is_empty()));
    assert_eq!(fx.server_value(row, name).as_deref(), Some("B"));
    Ok(())
}

#[tokio::test]
async fn search_filters_merged_values() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let name = fx.table.columns[0].column_id;
    let rows: Vec<_> = fx.table.rows.iter().map(|r| r.row_id).collect();
    fx.session.update_cell(&RowKey::Real(rows[0]), name, "Alice").await?;
    fx.session.update_cell(&RowKey::Real(rows[1]), name, "Bob").await?;
    let temp = fx.session.begin_row();
    fx.session.update_cell(&RowKey::Temp(temp.clone()), name, "alicia").await?;

    let hits = fx.session.view(Some("ALI"));
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].real_id, Some(rows[0]));
    assert_eq!(hits[1].key, RowKey::Temp(temp));
    assert_eq!(fx.session.row_at(0, Some("bob")).and_then(|r| r.real_id), Some(rows[1]));
    assert!(fx.session.row_at(1, Some("bob")).is_none());
    Ok(())
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn invalid_number_is_rejected_before_dispatch() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let row = RowKey::Real(fx.table.rows[0].row_id);
    let age = fx.table.columns[1].column_id;

    for bad in ["12a", "1..2", "--5"] {
        let err = fx.session.update_cell(&row, age, bad).await.unwrap_err();
        assert!(err.is_validation(), "{bad}: {err}");
        assert!(matches!(err, EngineError::Validation { column_id, .. } if column_id == age));
    }
    assert_eq!(fx.transport.call_count("upsert_cell"), 0);
    assert!(fx.session.cell_issue(&row, age).is_some());
    assert_eq!(fx.session.view(None)[0].value(age), Some(""));

    for ok in ["123", "-45.67", "1.2e-3", ""] {
        fx.session.update_cell(&row, age, ok).await?;
    }
    assert_eq!(fx.transport.call_count("upsert_cell"), 4);
    assert!(fx.session.cell_issue(&row, age).is_none());
    Ok(())
}

#[tokio::test]
async fn server_side_validation_failure_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let row = RowKey::Real(fx.table.rows[0].row_id);
    let name = fx.table.columns[0].column_id;
    fx.session.update_cell(&row, name, "kept").await?;

    fx.transport.fail_next(TransportErrorKind::Validation);
    let err = fx.session.update_cell(&row, name, "lost").await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(fx.session.view(None)[0].value(name), Some("kept"));
    assert!(fx.session.cell_issue(&row, name).is_some());

    assert!(fx.session.clear_cell_issue(&row, name));
    assert!(fx.session.cell_issue(&row, name).is_none());
    Ok(())
}

// ============================================================================
// Update failures
// ============================================================================

#[tokio::test]
async fn failed_write_restores_only_that_cell() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let row = RowKey::Real(fx.table.rows[0].row_id);
    let (name, email) = (fx.table.columns[0].column_id, fx.table.columns[2].column_id);

    fx.gate.hold();
    let session = fx.session.clone();
    let key = row.clone();
    let email_write = tokio::spawn(async move { session.update_cell(&key, email, "a@b.c").await });
    fx.gate.wait_for_parked(1).await;

    fx.transport.fail_next(TransportErrorKind::Network);
    let session = fx.session.clone();
    let key = row.clone();
    let name_write = tokio::spawn(async move { session.update_cell(&key, name, "Ada").await });
    fx.gate.wait_for_parked(2).await;

    fx.gate.release_last();
    let err = name_write.await?.unwrap_err();
    assert!(matches!(err, EngineError::Transport(TransportError::Network(_))));
    fx.gate.open();
    email_write.await??;

    let view = fx.session.view(None);
    assert_eq!(view[0].value(name), Some(""));
    assert_eq!(view[0].value(email), Some("a@b.c"));
    assert!(fx.session.with_store(|s| s.ledger().is_empty()));
    Ok(())
}

#[tokio::test]
async fn forbidden_write_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let row = RowKey::Real(fx.table.rows[1].row_id);
    let name = fx.table.columns[0].column_id;

    fx.transport.fail_next(TransportErrorKind::Forbidden);
    let err = fx.session.update_cell(&row, name, "x").await.unwrap_err();
    assert!(matches!(err, EngineError::Transport(TransportError::Forbidden(_))));
    assert_eq!(fx.session.view(None)[1].value(name), Some(""));
    Ok(())
}

#[tokio::test]
async fn unknown_targets_are_reported() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let name = fx.table.columns[0].column_id;
    let row = RowKey::Real(fx.table.rows[0].row_id);

    let err = fx
        .session
        .update_cell(&RowKey::Real(gridbase_core::RowId::new()), name, "x")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RowNotFound(_)));

    let err = fx
        .session
        .update_cell(&row, gridbase_core::ColumnId::new(), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ColumnNotFound(_)));
    assert_eq!(fx.transport.call_count("upsert_cell"), 0);
    Ok(())
}

// ============================================================================
// Row creation
// ============================================================================

#[tokio::test]
async fn created_row_keeps_temp_identity_and_flushes_typed_values(
) -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let name = fx.table.columns[0].column_id;

    fx.gate.hold();
    let (temp, handle) = fx.session.create_row();
    fx.gate.wait_for_parked(1).await;

    let view = fx.session.view(None);
    assert_eq!(view.len(), 4);
    let last = view.last().ok_or("empty view")?;
    assert_eq!(last.key, RowKey::Temp(temp.clone()));
    assert!(last.real_id.is_none());
    assert!(last.cells.iter().all(|c| c.value.is_empty()));

    let typed = fx.session.update_cell(&RowKey::Temp(temp.clone()), name, "X").await?;
    assert_eq!(typed, CellWrite::Deferred);
    assert_eq!(fx.transport.call_count("upsert_cell"), 0);

    fx.gate.open();
    let real_id = handle.await??;
    assert_eq!(fx.transport.call_count("upsert_cell"), 1);
    assert_eq!(fx.server_value(real_id, name).as_deref(), Some("X"));

    // Someone else's value lands on the server; the temp row still wins.
    fx.server
        .with_storage(|s| s.upsert_cell(fx.owner, real_id, name, "Y"))?;
    fx.session.refresh().await?;
    let matching: Vec<_> = fx
        .session
        .view(None)
        .into_iter()
        .filter(|r| r.real_id == Some(real_id))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].key, RowKey::Temp(temp));
    assert_eq!(matching[0].value(name), Some("X"));
    assert_eq!(matching[0].position, 3);
    Ok(())
}

#[tokio::test]
async fn edits_after_confirmation_go_to_the_real_row() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let email = fx.table.columns[2].column_id;

    let (temp, handle) = fx.session.create_row();
    let real_id = handle.await??;
    let outcome = fx
        .session
        .update_cell(&RowKey::Temp(temp.clone()), email, "t@x.io")
        .await?;
    assert!(matches!(outcome, CellWrite::Confirmed(ref c) if c.row_id == real_id));

    // Addressing the real id reaches the same logical row.
    fx.session.update_cell(&RowKey::Real(real_id), email, "r@x.io").await?;
    let row = fx
        .session
        .view(None)
        .into_iter()
        .find(|r| r.real_id == Some(real_id))
        .ok_or("row missing")?;
    assert_eq!(row.key, RowKey::Temp(temp));
    assert_eq!(row.value(email), Some("r@x.io"));
    assert_eq!(fx.server_value(real_id, email).as_deref(), Some("r@x.io"));
    Ok(())
}

#[tokio::test]
async fn failed_creation_keeps_the_temp_row() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let name = fx.table.columns[0].column_id;

    fx.gate.hold();
    fx.transport.fail_next(TransportErrorKind::Network);
    let (temp, handle) = fx.session.create_row();
    fx.gate.wait_for_parked(1).await;
    fx.session.update_cell(&RowKey::Temp(temp.clone()), name, "draft").await?;
    fx.gate.open();

    assert!(handle.await?.is_err());
    let view = fx.session.view(None);
    let row = view.last().ok_or("empty view")?;
    assert_eq!(row.key, RowKey::Temp(temp.clone()));
    assert_eq!(row.value(name), Some("draft"));

    // Retrying persists the row and flushes the draft.
    let real_id = fx.session.persist_row(&temp).await?;
    assert_eq!(fx.server_value(real_id, name).as_deref(), Some("draft"));
    Ok(())
}

// ============================================================================
// Row deletion
// ============================================================================

#[tokio::test]
async fn delete_is_optimistic_and_restored_on_failure() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let row = RowKey::Real(fx.table.rows[0].row_id);

    fx.transport.fail_next(TransportErrorKind::Network);
    assert!(fx.session.delete_row(&row).await.is_err());
    assert_eq!(fx.session.len(), 3);
    assert_eq!(fx.session.view(None)[0].key, row);

    fx.session.delete_row(&row).await?;
    assert_eq!(fx.session.len(), 2);
    assert!(fx.session.view(None).iter().all(|r| r.key != row));
    let remaining = fx
        .server
        .with_storage(|s| s.list_rows(fx.owner, fx.table.table.table_id))?;
    assert_eq!(remaining.len(), 2);

    // The page read that follows does not bring it back.
    fx.session.refresh().await?;
    assert_eq!(fx.session.len(), 2);
    Ok(())
}

#[tokio::test]
async fn deleting_an_unsent_temp_row_is_local() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let temp = fx.session.begin_row();
    assert_eq!(fx.session.len(), 4);

    fx.session.delete_row(&RowKey::Temp(temp.clone())).await?;
    assert_eq!(fx.session.len(), 3);
    assert_eq!(fx.transport.call_count("delete_row"), 0);

    let err = fx.session.delete_row(&RowKey::Temp(temp)).await.unwrap_err();
    assert!(matches!(err, EngineError::RowNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn delete_during_creation_removes_server_orphan() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;

    fx.gate.hold();
    let (temp, handle) = fx.session.create_row();
    fx.gate.wait_for_parked(1).await;
    fx.session.delete_row(&RowKey::Temp(temp)).await?;
    fx.gate.open();

    assert!(matches!(handle.await?, Err(EngineError::RowNotFound(_))));
    assert_eq!(fx.transport.call_count("delete_row"), 1);
    let rows = fx
        .server
        .with_storage(|s| s.list_rows(fx.owner, fx.table.table.table_id))?;
    assert_eq!(rows.len(), 3);
    assert_eq!(fx.session.len(), 3);
    Ok(())
}

#[tokio::test]
async fn deleting_a_confirmed_temp_row_deletes_the_real_row(
) -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let (temp, handle) = fx.session.create_row();
    let real_id = handle.await??;

    fx.session.delete_row(&RowKey::Temp(temp)).await?;
    assert_eq!(fx.session.len(), 3);
    assert!(fx.session.view(None).iter().all(|r| r.real_id != Some(real_id)));
    assert_eq!(fx.server_value(real_id, fx.table.columns[0].column_id), None);
    let rows = fx
        .server
        .with_storage(|s| s.list_rows(fx.owner, fx.table.table.table_id))?;
    assert!(rows.iter().all(|r| r.row_id != real_id));
    Ok(())
}

// ============================================================================
// Batch saves
// ============================================================================

#[tokio::test]
async fn batch_save_validates_all_then_writes_once() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let (r0, r1) = (fx.table.rows[0].row_id, fx.table.rows[1].row_id);
    let (name, age) = (fx.table.columns[0].column_id, fx.table.columns[1].column_id);

    let err = fx
        .session
        .save_cells(vec![
            CellEdit::new(r0, name, "Ada"),
            CellEdit::new(r1, age, "thirty"),
        ])
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(fx.transport.call_count("batch_upsert_cells"), 0);
    assert_eq!(fx.session.view(None)[0].value(name), Some(""));

    let cells = fx
        .session
        .save_cells(vec![CellEdit::new(r0, name, "Ada"), CellEdit::new(r1, age, "30")])
        .await?;
    assert_eq!(cells.len(), 2);
    assert_eq!(fx.transport.call_count("batch_upsert_cells"), 1);
    assert_eq!(fx.server_value(r1, age).as_deref(), Some("30"));
    let view = fx.session.view(None);
    assert_eq!(view[0].value(name), Some("Ada"));
    assert_eq!(view[1].value(age), Some("30"));
    assert!(fx.session.with_store(|s| s.ledger().is_empty()));
    Ok(())
}

#[tokio::test]
async fn failed_batch_rolls_back_every_cell() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let (r0, r1) = (fx.table.rows[0].row_id, fx.table.rows[1].row_id);
    let name = fx.table.columns[0].column_id;
    let temp = fx.session.begin_row();

    fx.transport.fail_next(TransportErrorKind::Network);
    let result = fx
        .session
        .save_cells(vec![
            CellEdit::new(r0, name, "a"),
            CellEdit::new(r1, name, "b"),
            CellEdit::new(temp.clone(), name, "held"),
        ])
        .await;
    assert!(result.is_err());

    let view = fx.session.view(None);
    assert_eq!(view[0].value(name), Some(""));
    assert_eq!(view[1].value(name), Some(""));
    // The temp row never reached the request, so its value stays.
    assert_eq!(view[3].value(name), Some("held"));
    assert!(fx.session.cell_issue(&RowKey::Real(r0), name).is_some());
    Ok(())
}

// ============================================================================
// Columns
// ============================================================================

#[tokio::test]
async fn column_placeholder_is_replaced_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;

    fx.gate.hold();
    let session = fx.session.clone();
    let create =
        tokio::spawn(async move { session.create_column("Score", Some(ColumnType::Number)).await });
    fx.gate.wait_for_parked(1).await;

    let columns = fx.session.columns();
    assert_eq!(columns.len(), 4);
    let placeholder = columns[3].column_id;
    assert_eq!(columns[3].position, 3);
    let err = fx
        .session
        .update_cell(&RowKey::Real(fx.table.rows[0].row_id), placeholder, "1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ColumnPending(id) if id == placeholder));

    fx.gate.open();
    let column = create.await??;
    let columns = fx.session.columns();
    assert_eq!(columns.len(), 4);
    assert_eq!(columns[3], column);

    fx.session
        .update_cell(&RowKey::Real(fx.table.rows[0].row_id), column.column_id, "9")
        .await?;
    assert_eq!(fx.session.view(None)[0].value(column.column_id), Some("9"));
    Ok(())
}

#[tokio::test]
async fn failed_column_create_restores_column_set() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    fx.transport.fail_next(TransportErrorKind::Forbidden);
    assert!(fx.session.create_column("Nope", None).await.is_err());
    assert_eq!(fx.session.columns(), fx.table.columns);
    Ok(())
}

#[tokio::test]
async fn deleted_column_leaves_no_local_references() -> Result<(), Box<dyn std::error::Error>> {
    let fx = Fixture::new().await?;
    let email = fx.table.columns[2].column_id;
    let row = RowKey::Real(fx.table.rows[0].row_id);
    fx.session.update_cell(&row, email, "a@b.c").await?;
    let temp = fx.session.begin_row();
    fx.session.update_cell(&RowKey::Temp(temp.clone()), email, "t@b.c").await?;

    fx.session.delete_column(email).await?;
    assert_eq!(fx.session.columns().len(), 2);
    assert!(fx.session.view(None).iter().all(|r| r.cell(email).is_none()));
    let leftovers = fx.session.with_store(|s| {
        s.cache().rows().any(|r| r.cell(email).is_some())
            || s.registry().get(&temp).is_some_and(|t| t.values.contains_key(&email))
    });
    assert!(!leftovers);

    let err = fx.session.update_cell(&row, email, "again").await.unwrap_err();
    assert!(matches!(err, EngineError::ColumnNotFound(_)));
    let err = fx.session.delete_column(email).await.unwrap_err();
    assert!(matches!(err, EngineError::ColumnNotFound(_)));
    Ok(())
}
