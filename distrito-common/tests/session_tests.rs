//! End-to-end tests for the district session
//!
//! Sessions run over `MemoryStore` so store failures can be injected.

use distrito_common::aggregation::Tally;
use distrito_common::diagnostics::{Diagnostic, Table};
use distrito_common::ledger::{RawAttendanceRow, RawVisitorRow};
use distrito_common::roster::{leader_set, PersonType, RawRosterRow, LEADER_PLACEHOLDER};
use distrito_common::store::{MemoryStore, RemoteStore};
use distrito_common::{Chamada, DateKey, Distrito, Error, YearMonth};

fn day(d: u32) -> DateKey {
    DateKey::from_ymd(2026, 2, d).unwrap()
}

async fn session_with_ana() -> Distrito<MemoryStore> {
    let mut session = Distrito::load(MemoryStore::new()).await;
    session.create_cell("Ana").await.unwrap();
    session.add_person("Ana", "Beto", PersonType::Member).await.unwrap();
    session
}

fn chamada(date: DateKey, beto_cell: bool, visitors: u32) -> Chamada {
    let mut chamada = Chamada::new(date, "Ana");
    chamada
        .mark("Ana", true, true)
        .mark("Beto", beto_cell, false)
        .with_visitors(visitors, 0);
    chamada
}

#[tokio::test]
async fn test_weekly_summary_counts_leader_as_member() {
    let mut session = session_with_ana().await;
    session.submit(&chamada(day(7), true, 0)).await.unwrap();

    let summary = session.weekly_summary(&leader_set(["Ana"]), day(7));
    assert_eq!(summary.members.cell, Tally { present: 2, eligible: Some(2) });
    assert_eq!(summary.members.service, Tally { present: 1, eligible: Some(2) });
    assert_eq!(summary.visitors.cell.present, 0);
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let mut session = session_with_ana().await;
    let week = chamada(day(7), true, 2);
    session.submit(&week).await.unwrap();
    let once = session.attendance().to_raw();

    session.submit(&week).await.unwrap();
    assert_eq!(session.attendance().to_raw(), once);
    assert_eq!(session.visitors().len(), 1);

    let summary = session.weekly_summary(&leader_set(["Ana"]), day(7));
    assert_eq!(summary.members.cell.present, 2);
    assert_eq!(summary.visitors.cell.present, 2);
}

#[tokio::test]
async fn test_two_absences_raise_alert() {
    let mut session = session_with_ana().await;
    session.submit(&chamada(day(7), false, 0)).await.unwrap();
    session.submit(&chamada(day(14), false, 0)).await.unwrap();

    let leaders = leader_set(["Ana"]);
    let alerts = session.person_absence_alerts(&leaders);
    assert_eq!(alerts.len(), 1);
    assert_eq!((alerts[0].person.as_str(), alerts[0].leader.as_str()), ("Beto", "Ana"));
    assert_eq!(alerts[0].person_type, Some(PersonType::Member));

    assert_eq!(session.no_visitor_alerts(&leaders), vec!["Ana".to_string()]);
}

#[tokio::test]
async fn test_writes_reach_the_store_and_reload() {
    let mut session = session_with_ana().await;
    session.submit(&chamada(day(7), true, 1)).await.unwrap();
    assert!(session.is_synced());

    let store = session.store();
    assert_eq!(store.read_attendance().await.unwrap().len(), 2);
    assert_eq!(store.read_visitors().await.unwrap().len(), 1);
    assert_eq!(
        store.read_roster().await.unwrap(),
        vec![RawRosterRow::new("Ana", "Beto", "Membro")]
    );

    let before = session.attendance().to_raw();
    session.reload().await;
    assert_eq!(session.attendance().to_raw(), before);
    assert!(session.diagnostics().is_empty());
}

#[tokio::test]
async fn test_template_and_unknown_people() {
    let mut session = session_with_ana().await;

    let template = session.chamada_template("Ana", day(7)).unwrap();
    assert_eq!(template.marks.len(), 2);
    assert!(matches!(
        session.chamada_template("Zé", day(7)),
        Err(Error::UnknownLeader(_))
    ));

    let mut stranger = Chamada::new(day(7), "Ana");
    stranger.mark("Fulano", true, true);
    assert!(matches!(session.submit(&stranger).await, Err(Error::InvalidInput(_))));
    assert!(session.attendance().is_empty());
}

#[tokio::test]
async fn test_load_degrades_on_unreadable_table() {
    let store = MemoryStore::with_rows(
        vec![RawAttendanceRow {
            date: "07/02/2026".to_string(),
            leader: "Ana".to_string(),
            name: "Beto".to_string(),
            person_type: "Membro".to_string(),
            cell: Some(1),
            service: Some(1),
        }],
        vec![RawVisitorRow {
            date: "07/02/2026".to_string(),
            leader: "Ana".to_string(),
            cell: Some(1),
            service: Some(0),
        }],
        vec![RawRosterRow::new("Ana", "Beto", "Membro")],
    );
    store.fail_reads(Table::Visitors, true).await;

    let session = Distrito::load(store).await;
    assert_eq!(session.attendance().len(), 1);
    assert!(session.visitors().is_empty());
    assert_eq!(session.leaders(), leader_set(["Ana"]));
    assert!(matches!(
        session.diagnostics(),
        [Diagnostic::TableUnavailable { table: Table::Visitors, .. }]
    ));
}

#[tokio::test]
async fn test_load_reports_bad_rows() {
    let rows = vec![
        RawAttendanceRow {
            date: "someday".to_string(),
            leader: "Ana".to_string(),
            name: "Beto".to_string(),
            person_type: "Membro".to_string(),
            cell: Some(1),
            service: Some(1),
        },
        RawAttendanceRow {
            date: "2026-02-07".to_string(),
            leader: "Ana".to_string(),
            name: "Beto".to_string(),
            person_type: "Membro".to_string(),
            cell: Some(0),
            service: Some(0),
        },
    ];
    let session = Distrito::load(MemoryStore::with_rows(rows, vec![], vec![])).await;

    assert_eq!(session.attendance().len(), 1);
    assert!(matches!(
        session.diagnostics(),
        [Diagnostic::UnparseableDate { table: Table::Attendance, .. }]
    ));
}

#[tokio::test]
async fn test_failed_write_keeps_state_until_flush() {
    let mut session = session_with_ana().await;
    session.store().fail_writes(Table::Attendance, true).await;

    let result = session.submit(&chamada(day(7), true, 0)).await;
    assert!(matches!(result, Err(Error::Store(_))));
    assert!(!session.is_synced());
    // No rollback: the local ledger holds the attempted submission
    assert_eq!(session.attendance().len(), 2);
    assert!(session.store().read_attendance().await.unwrap().is_empty());

    session.store().fail_writes(Table::Attendance, false).await;
    session.flush().await.unwrap();
    assert!(session.is_synced());
    assert_eq!(session.store().read_attendance().await.unwrap().len(), 2);
    assert_eq!(session.store().read_visitors().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_summary_cache_invalidated_by_writes() {
    let mut session = session_with_ana().await;
    session.submit(&chamada(day(7), false, 0)).await.unwrap();
    let leaders = leader_set(["Ana"]);
    assert_eq!(session.weekly_summary(&leaders, day(7)).members.cell.present, 1);

    session.submit(&chamada(day(7), true, 0)).await.unwrap();
    assert_eq!(session.weekly_summary(&leaders, day(7)).members.cell.present, 2);

    session.add_person("Ana", "Carla", PersonType::Member).await.unwrap();
    assert_eq!(session.weekly_summary(&leaders, day(7)).members.cell.eligible, Some(3));
}

#[tokio::test]
async fn test_roster_management_persists() {
    let mut session = session_with_ana().await;
    assert!(matches!(session.create_cell("Ana").await, Err(Error::DuplicateLeader(_))));
    assert!(matches!(
        session.add_person("Zé", "Beto", PersonType::Member).await,
        Err(Error::UnknownLeader(_))
    ));

    session.create_cell("Davi").await.unwrap();
    assert_eq!(session.remove_person("Ana", "Ninguém").await.unwrap(), None);
    assert_eq!(session.remove_person("Ana", "Beto").await.unwrap(), Some(PersonType::Member));

    session.reload().await;
    assert_eq!(session.leaders(), leader_set(["Ana", "Davi"]));
    assert!(session.roster().members("Ana").unwrap().is_empty());

    let removed = session.delete_cell("Davi").await.unwrap();
    assert!(removed.is_empty());
    session.reload().await;
    assert_eq!(session.leaders(), leader_set(["Ana"]));
}

#[tokio::test]
async fn test_monthly_views() {
    let mut session = session_with_ana().await;
    session.submit(&chamada(day(7), true, 1)).await.unwrap();
    session.submit(&chamada(day(14), false, 0)).await.unwrap();

    let leaders = leader_set(["Ana"]);
    let february = YearMonth::new(2026, 2).unwrap();

    let series = session.monthly_series(&leaders, february);
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].date, day(7));
    // Ana + Beto + one visitor
    assert_eq!(series[0].cell_total, 3);

    let rollup = session.comparative_rollup(&leaders, 2, february).unwrap();
    assert_eq!(rollup.len(), 3);
    assert_eq!(rollup[2].month, february);
    assert_eq!(rollup[0].cell_total, 0);

    assert_eq!(session.evolution(&leaders).len(), 2);
}

#[tokio::test]
async fn test_bad_roster_row_keeps_other_cells() {
    let store = MemoryStore::with_rows(
        vec![],
        vec![],
        vec![
            RawRosterRow::new("Ana", "Beto", "Membro"),
            RawRosterRow::new("Davi", LEADER_PLACEHOLDER, "Liderança"),
            RawRosterRow::new("Ana", "Zé", "Visitante"),
        ],
    );
    let mut session = Distrito::load(store).await;

    assert_eq!(session.leaders(), leader_set(["Ana", "Davi"]));
    assert!(matches!(
        session.diagnostics(),
        [Diagnostic::MalformedRow { table: Table::Roster, .. }]
    ));

    // Rewriting the roster keeps every cell that loaded
    session.create_cell("Gil").await.unwrap();
    let stored = session.store().read_roster().await.unwrap();
    assert_eq!(
        stored,
        vec![
            RawRosterRow::new("Ana", "Beto", "Membro"),
            RawRosterRow::new("Davi", LEADER_PLACEHOLDER, "Liderança"),
            RawRosterRow::new("Gil", LEADER_PLACEHOLDER, "Liderança"),
        ]
    );
}

#[tokio::test]
async fn test_leader_cannot_be_added_to_own_cell() {
    let mut session = session_with_ana().await;
    assert!(matches!(
        session.add_person("Ana", "Ana", PersonType::Member).await,
        Err(Error::InvalidInput(_))
    ));

    session.submit(&chamada(day(7), true, 0)).await.unwrap();
    let summary = session.weekly_summary(&leader_set(["Ana"]), day(7));
    assert_eq!(summary.members.cell.eligible, Some(2));
}

#[tokio::test]
async fn test_unreadable_table_is_not_overwritten() {
    let store = MemoryStore::with_rows(vec![], vec![], vec![RawRosterRow::new("Ana", "Beto", "Membro")]);
    store.fail_reads(Table::Roster, true).await;
    let mut session = Distrito::load(store).await;
    assert!(session.leaders().is_empty());

    assert!(matches!(session.create_cell("Gil").await, Err(Error::Store(_))));
    assert!(!session.is_synced());
    assert_eq!(session.store().write_count().await, 0);

    session.store().fail_reads(Table::Roster, false).await;
    session.reload().await;
    assert_eq!(session.leaders(), leader_set(["Ana"]));

    session.create_cell("Gil").await.unwrap();
    assert!(session.is_synced());
    assert_eq!(session.store().read_roster().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_float_flags_load_and_survive_a_later_submit() {
    let rows: Vec<RawAttendanceRow> = serde_json::from_str(
        r#"[{"Data": "07/02/2026", "Líder": "Ana", "Nome": "Beto", "Tipo": "Membro", "Célula": 1.0, "Culto": 0.0}]"#,
    )
    .unwrap();
    let store = MemoryStore::with_rows(rows, vec![], vec![RawRosterRow::new("Ana", "Beto", "Membro")]);
    let mut session = Distrito::load(store).await;

    assert!(session.diagnostics().is_empty());
    assert_eq!(session.attendance().len(), 1);

    session.submit(&chamada(day(14), true, 0)).await.unwrap();
    assert_eq!(session.store().read_attendance().await.unwrap().len(), 3);
}
