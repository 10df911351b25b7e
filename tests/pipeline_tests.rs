//! End-to-end runs of the import pipeline against mock HTTP endpoints.

use cvmscraper::{
    config::RUN_MARKER_FILE, fetch::PARTIAL_PREFIX, FileOutcome, ImportConfig, ImportError,
    Pipeline, Store, Table, Value,
};
use std::{
    fs,
    io::{Cursor, Write},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tempfile::tempdir;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{fmt, layer::Context, prelude::*, EnvFilter, Layer};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};
use zip::{write::FileOptions, CompressionMethod};

const REGISTRY_PATH: &str = "/CAD/DADOS/cad_cia_aberta.csv";
const ARCHIVE_PATH: &str = "/FRE/DADOS/fre_cia_aberta_2024.zip";

const REGISTRY_CSV: &str = "CNPJ_CIA;DENOM_SOCIAL;CD_CVM;SIT;UF\n\
    00.000.000/0001-91;BANCO DO BRASIL S.A.;1023;ATIVO;DF\n\
    00.001.180/0001-26;ELETROBRAS;2437;ATIVO;RJ\n\
    33.000.167/0001-01;PETRÓLEO BRASILEIRO S.A.;9512;ATIVO;RJ\n";

const AGE_CSV: &str = "CNPJ_Companhia;Data_Referencia;Quantidade_Ate30Anos;Quantidade_30a50Anos;Quantidade_Acima50Anos\n\
    00.000.000/0001-91;2024-12-31;1200;50000;30000\n\
    00.001.180/0001-26;2024-12-31;300;4000;2500\n";

const RACE_CSV: &str = "CNPJ_Companhia;Quantidade_Amarelo;Quantidade_Branco;Quantidade_Preto;Quantidade_Pardo\n\
    00.000.000/0001-91;800;52000;6000;20000\n";

const GENDER_CSV: &str = "CNPJ_Companhia;Quantidade_Feminino;Quantidade_Masculino;Quantidade_Nao_Binario\n\
    00.000.000/0001-91;35000;46000;12\n\
    33.000.167/0001-01;7000;38000;3\n";

fn init_logging() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Counts this crate's WARN events seen by the subscriber it is layered onto.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::WARN && meta.target().starts_with("cvmscraper") {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

fn zip_bytes(members: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, body) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(&latin1(body)).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn all_members() -> Vec<(&'static str, &'static str)> {
    vec![
        ("fre_cia_aberta_empregado_local_faixa_etaria_2024.csv", AGE_CSV),
        ("fre_cia_aberta_empregado_local_declaracao_raca_2024.csv", RACE_CSV),
        ("fre_cia_aberta_empregado_local_declaracao_genero_2024.csv", GENDER_CSV),
        ("fre_cia_aberta_2024.csv", "ignored;header\n1;2\n"),
    ]
}

fn config_for(server: &MockServer, root: &Path) -> ImportConfig {
    let mut cfg =
        ImportConfig::default().with_paths(root.join("staging"), root.join("store").join("database.db"));
    cfg.registry.url = format!("{}{}", server.uri(), REGISTRY_PATH);
    cfg.archive.url = format!("{}{}", server.uri(), ARCHIVE_PATH);
    cfg
}

async fn serve(server: &MockServer, route: &str, status: u16, body: Vec<u8>, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
        .expect(times)
        .mount(server)
        .await;
}

fn staging_entries(cfg: &ImportConfig) -> usize {
    fs::read_dir(&cfg.staging_dir).unwrap().count()
}

#[tokio::test]
async fn full_run_loads_four_tables_and_empties_staging() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 1).await;
    serve(&server, ARCHIVE_PATH, 200, zip_bytes(&all_members()), 1).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    let pipeline = Pipeline::new(cfg.clone()).unwrap();

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.loaded(), 4);
    assert_eq!(report.skipped(), 0);
    assert_eq!(report.extracted.len(), 3);
    assert!(!report.resumed);
    assert!(report.cleanup.is_clean());
    assert!(report.outcomes.iter().all(|o| o.cleaned));
    assert_eq!(staging_entries(&cfg), 0);

    let store = pipeline.store();
    for table in cfg.datasets().map(|d| &d.table) {
        assert!(store.row_count(table).unwrap() > 0, "{table} is empty");
    }
    assert!(!store.table_exists("fre_cia_aberta_2024").unwrap());

    let registry = store.read_all("companhias_abertas").unwrap();
    assert_eq!(registry.columns().len(), 6);
    let ids: Vec<_> = registry.column(0).filter_map(Value::as_i64).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(
        registry.record(2).unwrap().get("DENOM_SOCIAL"),
        Some(&Value::Text("PETRÓLEO BRASILEIRO S.A.".into()))
    );

    let gender = store.read_all("declaracao_genero_2024").unwrap();
    let women: i64 = gender
        .records()
        .filter_map(|r| r.get("Quantidade_Feminino").and_then(Value::as_i64))
        .sum();
    assert_eq!(women, 42000);
}

#[tokio::test]
async fn missing_member_is_skipped_with_one_warning() {
    init_logging();
    let server = MockServer::start().await;
    let mut members = all_members();
    members.retain(|(name, _)| !name.contains("genero"));
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 1).await;
    serve(&server, ARCHIVE_PATH, 200, zip_bytes(&members), 1).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    let pipeline = Pipeline::new(cfg.clone()).unwrap();

    let warnings = WarnCounter::default();
    let report = {
        // current_thread test runtime, so the thread-local subscriber sees the whole run
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));
        let report = pipeline.run().await.unwrap();
        report.log_summary();
        report
    };
    assert_eq!(warnings.count(), 1);
    assert_eq!(report.loaded(), 3);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 0);
    assert_eq!(
        report.outcome_for("declaracao_genero"),
        Some(&FileOutcome::SkippedMissing)
    );
    assert!(!pipeline.store().table_exists("declaracao_genero_2024").unwrap());
    assert_eq!(staging_entries(&cfg), 0);
}

#[tokio::test]
async fn registry_http_error_aborts_before_touching_store() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 500, Vec::new(), 1).await;
    serve(&server, ARCHIVE_PATH, 200, zip_bytes(&all_members()), 0).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    let store = Store::open(&cfg.store_path);
    let mut before = Table::new(vec!["id".into(), "DENOM_SOCIAL".into()]);
    before.push_row(vec![Value::Integer(1), Value::Text("OLD".into())]);
    store.write_all("companhias_abertas", &before).unwrap();

    let err = Pipeline::new(cfg.clone()).unwrap().run().await.unwrap_err();
    assert!(matches!(err, ImportError::Fetch { .. }), "{err}");

    let after = store.read_all("companhias_abertas").unwrap();
    assert_eq!(after.columns(), before.columns());
    assert_eq!(after.rows(), before.rows());
    assert_eq!(store.table_names().unwrap(), vec!["companhias_abertas".to_string()]);
    assert!(!cfg.registry_path().exists());
}

#[tokio::test]
async fn bad_member_does_not_stop_the_others() {
    init_logging();
    let server = MockServer::start().await;
    let mut members = all_members();
    members[1].1 = "A;B\n1;2;3;4\n";
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 1).await;
    serve(&server, ARCHIVE_PATH, 200, zip_bytes(&members), 1).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    let report = Pipeline::new(cfg.clone()).unwrap().run().await.unwrap();

    assert_eq!(report.loaded(), 3);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.outcome_for("declaracao_raca"),
        Some(FileOutcome::Failed(_))
    ));
    assert_eq!(staging_entries(&cfg), 0);
}

#[tokio::test]
async fn pre_staged_archive_is_not_fetched_or_extracted() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 1).await;
    serve(&server, ARCHIVE_PATH, 200, Vec::new(), 0).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    fs::create_dir_all(&cfg.staging_dir).unwrap();
    fs::write(cfg.archive_path(), zip_bytes(&all_members())).unwrap();

    let report = Pipeline::new(cfg.clone()).unwrap().run().await.unwrap();
    assert_eq!(report.loaded(), 1);
    assert_eq!(report.skipped(), 3);
    assert!(report.extracted.is_empty());
    assert_eq!(staging_entries(&cfg), 0);
}

#[tokio::test]
async fn interrupted_run_forces_re_extraction() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 0).await;
    serve(&server, ARCHIVE_PATH, 200, Vec::new(), 0).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    fs::create_dir_all(&cfg.staging_dir).unwrap();
    fs::write(cfg.registry_path(), latin1(REGISTRY_CSV)).unwrap();
    fs::write(cfg.archive_path(), zip_bytes(&all_members())).unwrap();
    fs::write(cfg.staging_dir.join(RUN_MARKER_FILE), "{}").unwrap();

    let report = Pipeline::new(cfg.clone()).unwrap().run().await.unwrap();
    assert!(report.resumed);
    assert_eq!(report.extracted.len(), 3);
    assert_eq!(report.loaded(), 4);
    assert_eq!(staging_entries(&cfg), 0);
}

#[tokio::test]
async fn crashed_download_leftover_is_swept() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 1).await;
    serve(&server, ARCHIVE_PATH, 200, zip_bytes(&all_members()), 1).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    fs::create_dir_all(&cfg.staging_dir).unwrap();
    let leftover = cfg.staging_dir.join(format!("{PARTIAL_PREFIX}a1b2c3"));
    fs::write(&leftover, "half a zip").unwrap();

    let report = Pipeline::new(cfg.clone()).unwrap().run().await.unwrap();
    assert_eq!(report.loaded(), 4);
    assert!(report.cleanup.removed.contains(&leftover));
    assert_eq!(staging_entries(&cfg), 0);
}

#[tokio::test]
async fn optional_archive_failure_still_loads_registry() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 1).await;
    serve(&server, ARCHIVE_PATH, 404, Vec::new(), 1).await;

    let tmp = tempdir().unwrap();
    let mut cfg = config_for(&server, tmp.path());
    cfg.archive_required = false;

    let report = Pipeline::new(cfg.clone()).unwrap().run().await.unwrap();
    assert_eq!(
        report.outcome_for("companhias_abertas"),
        Some(&FileOutcome::Loaded { rows: 3 })
    );
    assert_eq!(report.failed(), 3);
    assert_eq!(staging_entries(&cfg), 0);
}

#[tokio::test]
async fn required_archive_failure_aborts() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 1).await;
    serve(&server, ARCHIVE_PATH, 404, Vec::new(), 1).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    let err = Pipeline::new(cfg.clone()).unwrap().run().await.unwrap_err();
    assert!(matches!(err, ImportError::Fetch { .. }), "{err}");
    assert!(!Store::open(&cfg.store_path).table_exists("companhias_abertas").unwrap());
}

#[tokio::test]
async fn second_run_replaces_rather_than_accumulates() {
    init_logging();
    let server = MockServer::start().await;
    serve(&server, REGISTRY_PATH, 200, latin1(REGISTRY_CSV), 2).await;
    serve(&server, ARCHIVE_PATH, 200, zip_bytes(&all_members()), 2).await;

    let tmp = tempdir().unwrap();
    let cfg = config_for(&server, tmp.path());
    let pipeline = Pipeline::new(cfg.clone()).unwrap();

    pipeline.run().await.unwrap();
    let first = pipeline.store().read_all("faixa_etaria_2024").unwrap();
    pipeline.run().await.unwrap();
    let second = pipeline.store().read_all("faixa_etaria_2024").unwrap();

    assert_eq!(first, second);
    assert_eq!(second.len(), 2);
}
