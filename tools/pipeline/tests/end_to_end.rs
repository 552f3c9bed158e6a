//! End-to-end runs of the batch job over on-disk fixtures
//!
//! Tests include:
//! - The Rochester proxy-key market with a relisted vehicle
//! - Mapping and radius tiers through the full run
//! - Per-query failures that do not abort the run
//! - A dealer's result does not depend on the other dealers queried
//! - Dealers derived from the feed when no table is configured
//! - Report export and disappearance tracking across runs

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use pipeline::{DealerOutcome, Pipeline, PipelineConfig, PipelineError, RunReport};
use rust_decimal::Decimal;
use tempfile::TempDir;
use types::errors::RejectKind;
use types::ids::DealerId;
use types::market::ResolutionTier;
use types::window::WindowSpec;

const FEED_HEADER: &str =
    "vin,mc_dealer_id,seller_name,make,model,trim,year,inventory_type,status_date,price,msrp,latitude,longitude,city,state,zip";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn feed(rows: &[&str]) -> String {
    let mut text = format!("{FEED_HEADER}\n");
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

fn rochester_feed() -> String {
    feed(&[
        "V1,12345,ABC Motors,Toyota,Camry,LE,2023,new,2025-01-10,28000,29500,,,Rochester,NY,14604",
        "V2,12345,ABC Motors,Toyota,RAV4,XLE,2022,used,2025-01-22,24000,,,,Rochester,NY,14604",
        "V3,12345,ABC Motors,Honda,Civic,EX,2021,used,2025-02-03,19000,,,,Rochester,NY,14604",
        "V4,67890,XYZ Auto,Toyota,Camry,SE,2024,new,2025-02-14,30000,31000,,,Rochester,NY,14623",
        "V3,12345,ABC Motors,Honda,Civic,EX,2021,used,2025-02-20,18500,,,,Rochester,NY,14604",
        "V5,67890,XYZ Auto,Ford,Escape,SE,2020,used,2025-03-01,17000,,,,Rochester,NY,14623",
        "V3,12345,ABC Motors,Honda,Civic,EX,2021,used,2025-03-09,18000,,,,Rochester,NY,14604",
        "V6,11111,Buffalo Cars,Ford,F-150,XL,2023,used,2025-02-11,35000,,,,Buffalo,NY,14201",
        ",12345,ABC Motors,Toyota,Camry,LE,2023,new,2025-01-11,,,,,Rochester,NY,14604",
        "V7,67890,XYZ Auto,Toyota,Camry,LE,2023,new,last tuesday,,,,,Rochester,NY,14623",
        "V8,67890,XYZ Auto,Toyota,Camry,LE,2023,new,2024-12-30,,,,,Rochester,NY,14623",
    ])
}

const DEALERS: &str = "dealer_id,name,latitude,longitude,city,state,zip,market_area
12345,ABC Motors,,,Rochester,NY,14604,
67890,XYZ Auto,,,Rochester,NY,14623,
11111,Buffalo Cars,,,Buffalo,NY,14201,
22222,Metro Motors,,,Albany,NY,12207,
33333,Metro Motors,,,Albany,NY,12208,
44444,Nowhere Lot,,,,,,
";

fn config(fixture: &Fixture, feed_body: &str, dealers: Option<&str>) -> PipelineConfig {
    let mut config = PipelineConfig::new(fixture.write("feed.csv", feed_body));
    config.dealers_file = dealers.map(|body| fixture.write("dealers.csv", body));
    config.window = WindowSpec::Rolling { months: 3 };
    config.today = NaiveDate::from_ymd_opt(2025, 4, 1);
    config.reader.chunk_size = 3;
    config.workers = 2;
    config
}

fn resolved<'a>(report: &'a RunReport, query: &str) -> &'a DealerOutcome {
    let outcome = report.outcome(query).unwrap();
    assert!(outcome.is_resolved(), "{query} did not resolve: {outcome:?}");
    outcome
}

#[test]
fn test_rochester_proxy_market() {
    let fixture = Fixture::new();
    let pipeline = Pipeline::new(config(&fixture, &rochester_feed(), Some(DEALERS)));

    let report = pipeline.run(&["12345"]).unwrap();

    assert_eq!(report.rows_processed, 11);
    assert_eq!(report.rows_rejected, 2);
    assert_eq!(report.rejections.count(RejectKind::MissingVin), 1);
    assert_eq!(report.rejections.count(RejectKind::UnparseableStatusDate), 1);
    assert_eq!(report.stats.duplicates, 2);
    assert_eq!(report.stats.outside_window, 1);
    assert!(!report.fingerprint.is_empty());

    match resolved(&report, "12345") {
        DealerOutcome::Resolved {
            dealer,
            tier,
            peer_count,
            ranking,
            overview,
            top_models,
            profile,
            ..
        } => {
            assert_eq!(dealer.name, "ABC Motors");
            assert_eq!(*tier, ResolutionTier::ProxyKey);
            assert_eq!(*peer_count, 1);

            let rows: Vec<(&str, u64, Decimal)> = ranking
                .entries
                .iter()
                .map(|e| (e.dealer_name.as_str(), e.sales, e.market_share))
                .collect();
            assert_eq!(
                rows,
                vec![
                    ("ABC Motors", 3, Decimal::from(60)),
                    ("XYZ Auto", 2, Decimal::from(40)),
                ]
            );
            assert_eq!(ranking.target_rank, Some(1));

            assert_eq!(overview.total_sales, 5);
            assert_eq!(overview.dealer_count, 2);
            assert_eq!(top_models[0].model, "camry");
            assert_eq!(top_models[0].sales, 2);

            assert_eq!(profile.totals.total, 3);
            let monthly: Vec<u64> = profile.periods.iter().map(|p| p.counts.total).collect();
            assert_eq!(monthly, vec![2, 1, 0]);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_failures_do_not_abort_other_queries() {
    let fixture = Fixture::new();
    let pipeline = Pipeline::new(config(&fixture, &rochester_feed(), Some(DEALERS)));

    let report = pipeline
        .run(&["XYZ Auto", "Metro Motors", "Nobody In Particular", "44444", "99999"])
        .unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.resolved().count(), 1);

    let error_of = |query: &str| match report.outcome(query).unwrap() {
        DealerOutcome::Failed { error, .. } => error.clone(),
        other => panic!("{query} should have failed: {other:?}"),
    };
    assert!(error_of("Metro Motors").contains("Ambiguous"));
    assert!(error_of("Metro Motors").contains("22222"));
    assert!(error_of("Nobody In Particular").contains("not found"));
    assert!(error_of("44444").contains("No market resolvable"));
    assert!(error_of("99999").contains("not found"));

    let ranking = report.outcome("XYZ Auto").unwrap().ranking().unwrap();
    assert_eq!(ranking.target_rank, Some(2));
    assert_eq!(ranking.target_share, Some(Decimal::from(40)));
}

#[test]
fn test_mapping_tier_merges_cities() {
    let fixture = Fixture::new();
    let mut config = config(&fixture, &rochester_feed(), Some(DEALERS));
    config.mapping_file = Some(fixture.write(
        "mapping.csv",
        "key,market_area\nROCHESTER|NY,538\n11111,538\n",
    ));

    let report = Pipeline::new(config).run(&["67890"]).unwrap();

    match resolved(&report, "67890") {
        DealerOutcome::Resolved { tier, ranking, .. } => {
            assert_eq!(*tier, ResolutionTier::Mapping);
            assert_eq!(ranking.dealer_count, 3);
            assert_eq!(ranking.total_market_sales, 6);
            let buffalo = ranking.entry(DealerId::new(11111)).unwrap();
            assert_eq!(buffalo.sales, 1);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_radius_tier() {
    let fixture = Fixture::new();
    let dealers = "dealer_id,name,latitude,longitude
1,Center Auto,40.0,-75.0
2,Near Auto,40.3,-75.0
3,Far Auto,41.0,-75.0
4,Broken Auto,95.0,-75.0
";
    let feed_body = feed(&[
        "A1,1,Center Auto,Kia,Soul,,2022,used,2025-02-01,,,,,,,",
        "A2,2,Near Auto,Kia,Soul,,2022,used,2025-02-02,,,,,,,",
        "A3,2,Near Auto,Kia,Rio,,2022,new,2025-02-03,,,,,,,",
        "A4,3,Far Auto,Kia,Rio,,2022,new,2025-02-04,,,,,,,",
    ]);
    let report = Pipeline::new(config(&fixture, &feed_body, Some(dealers)))
        .run(&["1"])
        .unwrap();

    match resolved(&report, "1") {
        DealerOutcome::Resolved {
            tier,
            ranking,
            excluded_candidates,
            ..
        } => {
            assert_eq!(*tier, ResolutionTier::Radius);
            let ids: Vec<u64> = ranking.entries.iter().map(|e| e.dealer_id.as_u64()).collect();
            assert_eq!(ids, vec![2, 1]);
            assert_eq!(excluded_candidates.len(), 1);
            assert_eq!(excluded_candidates[0].dealer_id, DealerId::new(4));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_vehicle_shared_across_markets_counts_in_each() {
    let fixture = Fixture::new();
    let dealers = "dealer_id,name,latitude,longitude,city,state,zip,market_area
11,Lake Auto,,,Rochester,NY,14604,
21,Falls Auto,,,Buffalo,NY,14201,
22,Harbor Auto,,,Buffalo,NY,14202,
";
    let feed_body = feed(&[
        "V1,11,Lake Auto,Mazda,CX-5,,2023,used,2025-01-10,,,,,Rochester,NY,14604",
        "V1,21,Falls Auto,Mazda,CX-5,,2023,used,2025-02-10,,,,,Buffalo,NY,14201",
        "V2,22,Harbor Auto,Mazda,CX-30,,2024,new,2025-02-12,,,,,Buffalo,NY,14202",
    ]);

    let alone = Pipeline::new(config(&fixture, &feed_body, Some(dealers)))
        .run(&["21"])
        .unwrap();
    let together = Pipeline::new(config(&fixture, &feed_body, Some(dealers)))
        .run(&["11", "21"])
        .unwrap();

    assert_eq!(together.markets, 2);
    assert_eq!(resolved(&alone, "21"), resolved(&together, "21"));

    let ranking = resolved(&together, "21").ranking().unwrap();
    let rows: Vec<(u64, u64, Decimal)> = ranking
        .entries
        .iter()
        .map(|e| (e.dealer_id.as_u64(), e.sales, e.market_share))
        .collect();
    assert_eq!(rows, vec![(21, 1, Decimal::from(50)), (22, 1, Decimal::from(50))]);
    assert_eq!(resolved(&together, "11").ranking().unwrap().total_market_sales, 1);
}

#[test]
fn test_dealers_derived_from_feed() {
    let fixture = Fixture::new();
    let report = Pipeline::new(config(&fixture, &rochester_feed(), None))
        .run(&["abc motors"])
        .unwrap();

    assert_eq!(report.reference_dealers, 3);
    let ranking = resolved(&report, "abc motors").ranking().unwrap();
    assert_eq!(ranking.entries.len(), 2);
    assert_eq!(ranking.entries[0].sales, 3);
}

#[test]
fn test_no_resolved_query_skips_pass() {
    let fixture = Fixture::new();
    let report = Pipeline::new(config(&fixture, &rochester_feed(), Some(DEALERS)))
        .run(&["Nobody"])
        .unwrap();
    assert_eq!(report.rows_processed, 0);
    assert!(report.fingerprint.is_empty());
}

#[test]
fn test_missing_source_is_fatal() {
    let fixture = Fixture::new();
    let mut config = config(&fixture, &rochester_feed(), Some(DEALERS));
    config.source = fixture.path("absent.csv");

    let err = Pipeline::new(config).run(&["12345"]).unwrap_err();
    assert!(matches!(err, PipelineError::Ingest(_)));
}

#[test]
fn test_missing_required_column_is_fatal() {
    let fixture = Fixture::new();
    let body = "vin,mc_dealer_id,status_date\nV1,12345,2025-01-10\n";
    let err = Pipeline::new(config(&fixture, body, Some(DEALERS)))
        .run(&["12345"])
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ingest(_)));
}

#[test]
fn test_report_export() {
    let fixture = Fixture::new();
    let pipeline = Pipeline::new(config(&fixture, &rochester_feed(), Some(DEALERS)));
    let report = pipeline.run(&["12345", "Nobody"]).unwrap();

    let path = fixture.path("out").join("report.json");
    report.write_to(&path).unwrap();

    let parsed: RunReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed, report);
}

#[test]
fn test_sold_detection_across_runs() {
    let fixture = Fixture::new();
    let state = fixture.path("tracker.json");

    let run_on = |day: u32, body: &str| {
        let mut config = config(&fixture, body, Some(DEALERS));
        config.today = NaiveDate::from_ymd_opt(2025, 4, day);
        config.tracker_state = Some(state.clone());
        config.disappear_days = 2;
        Pipeline::new(config).run(&["12345"]).unwrap()
    };

    let first = run_on(1, &rochester_feed());
    assert_eq!(first.sold_vehicles.as_deref().map(<[_]>::len), Some(0));

    let shrunk = feed(&["V1,12345,ABC Motors,Toyota,Camry,LE,2023,new,2025-01-10,,,,,Rochester,NY,14604"]);
    assert_eq!(run_on(2, &shrunk).sold_vehicles.unwrap().len(), 0);
    let sold = run_on(3, &shrunk).sold_vehicles.unwrap();

    let vins: Vec<&str> = sold.iter().map(|s| s.vin.as_str()).collect();
    assert_eq!(vins, vec!["V2", "V3", "V4", "V5", "V6", "V8"]);
    assert!(sold.iter().all(|s| s.last_seen == NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()));
    assert!(Path::new(&state).exists());
}
