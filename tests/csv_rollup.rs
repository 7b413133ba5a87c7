use region_rollup::config::RollupConfig;
use region_rollup::rollup::{self, Rollup, UnitOutcome};
use region_rollup::store::{CsvStore, Value};
use tempfile::TempDir;

fn write(dir: &std::path::Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).expect("write csv");
}

fn region_csv() -> String {
    [
        "id,parent_id,channel_total,channel_online,channel_broken,device_total,device_online,device_broken",
        "1,0,0,0,0,0,0,0",
        "2,1,0,0,0,0,0,0",
        "3,1,0,0,0,0,0,0",
        "4,3,0,0,0,0,0,0",
        "",
    ]
    .join("\n")
}

fn counters_of(store: &CsvStore, id: i64) -> Vec<Value> {
    let table = store.table("region").expect("region table");
    table
        .rows()
        .iter()
        .find(|row| row[0] == Value::Integer(id))
        .map(|row| row[2..].to_vec())
        .expect("region row")
}

#[tokio::test]
async fn pass_over_csv_files_writes_totals_to_disk() {
    let tmp = TempDir::new().expect("tempdir");
    write(tmp.path(), "region.csv", &region_csv());
    write(
        tmp.path(),
        "channel.csv",
        "id,region_id,status\nc1,1,2\nc2,2,2\nc3,4,1\nc4,4,0\n",
    );
    write(tmp.path(), "device.csv", "id,region_id,status\nd1,3,2\nd2,4,2\n");

    {
        let mut store = CsvStore::open(tmp.path()).expect("open");
        let report = Rollup::new(&mut store, RollupConfig::default())
            .run_pass()
            .await
            .expect("pass");
        assert!(report.is_clean());
        assert_eq!(report.updates.len(), 4);
    }

    let store = CsvStore::open(tmp.path()).expect("reopen");
    let expect = |v: [i64; 6]| v.iter().map(|&n| Value::Integer(n)).collect::<Vec<_>>();
    assert_eq!(counters_of(&store, 1), expect([4, 2, 1, 2, 2, 0]));
    assert_eq!(counters_of(&store, 2), expect([1, 1, 0, 0, 0, 0]));
    assert_eq!(counters_of(&store, 3), expect([2, 0, 1, 2, 2, 0]));
    assert_eq!(counters_of(&store, 4), expect([2, 0, 1, 1, 1, 0]));
}

#[tokio::test]
async fn transactional_pass_over_csv_commits_files() {
    let tmp = TempDir::new().expect("tempdir");
    write(tmp.path(), "region.csv", &region_csv());
    write(tmp.path(), "channel.csv", "id,region_id,status\nc1,4,2\n");
    write(tmp.path(), "device.csv", "id,region_id,status\n");

    {
        let mut store = CsvStore::open(tmp.path()).expect("open");
        let config = RollupConfig {
            transactional: true,
            ..RollupConfig::default()
        };
        let report = Rollup::new(&mut store, config).run_pass().await.expect("pass");
        assert_eq!(report.unit, UnitOutcome::Committed);
    }

    let store = CsvStore::open(tmp.path()).expect("reopen");
    for id in [1, 3, 4] {
        assert_eq!(counters_of(&store, id)[0], Value::Integer(1), "region {id}");
    }
    assert_eq!(counters_of(&store, 2)[0], Value::Integer(0));
}

#[tokio::test]
async fn initialized_tables_roll_up_to_no_root() {
    let tmp = TempDir::new().expect("tempdir");
    let config = RollupConfig::default();
    {
        let mut store = CsvStore::open(tmp.path()).expect("open");
        for (table, columns) in rollup::table_layouts(&config) {
            store.create_table(&table, columns).expect("create");
        }
    }
    assert!(tmp.path().join("region.csv").exists());
    assert!(tmp.path().join("schemas").join("channel.json").exists());

    let mut store = CsvStore::open(tmp.path()).expect("reopen");
    let err = Rollup::new(&mut store, config).run_pass().await.unwrap_err();
    assert!(err.to_string().contains("No root region found"));
}

#[tokio::test]
async fn ids_with_leading_zeros_survive_a_pass() {
    let tmp = TempDir::new().expect("tempdir");
    let header = "id,parent_id,channel_total,channel_online,channel_broken,device_total,device_online,device_broken";
    write(
        tmp.path(),
        "region.csv",
        &format!("{header}\n007,0,0,0,0,0,0,0\n008,007,0,0,0,0,0,0\n01,008,0,0,0,0,0,0\n1,01,0,0,0,0,0,0\n"),
    );
    write(tmp.path(), "channel.csv", "id,region_id,status\nc1,1,2\n");
    write(tmp.path(), "device.csv", "id,region_id,status\n");

    {
        let mut store = CsvStore::open(tmp.path()).expect("open");
        let report = Rollup::new(&mut store, RollupConfig::default())
            .run_pass()
            .await
            .expect("pass");
        assert!(report.is_clean());
        assert_eq!(report.roots, vec!["007".to_string()]);
    }

    let contents = std::fs::read_to_string(tmp.path().join("region.csv")).expect("read");
    assert_eq!(
        contents,
        format!(
            "{header}\n007,0,1,1,0,0,0,0\n008,007,1,1,0,0,0,0\n01,008,1,1,0,0,0,0\n1,01,1,1,0,0,0,0\n"
        )
    );
}
