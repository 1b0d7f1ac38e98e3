use crate::error::{Error, Result};
use csv::Writer;
use log::LevelFilter;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub fn write_records(output: &Path, records: Vec<impl Serialize>) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = Writer::from_path(output)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Sends log records to stderr so stdout only carries the annotation.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))
}

/// Resolves the query text from exactly one of an inline query or a file.
pub fn read_query(query: Option<String>, query_file: Option<PathBuf>) -> Result<String> {
    match (query, query_file) {
        (Some(query), None) => Ok(query),
        (None, Some(path)) => Ok(fs::read_to_string(path)?),
        (Some(_), Some(_)) => Err(Error::InvalidQuery(
            "give either a query or a query file, not both".to_string(),
        )),
        (None, None) => Err(Error::InvalidQuery("no query given".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostTables;
    use crate::plan::PlanTree;
    use crate::test_utils::{join, scan};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_cost_records() {
        let aqp = PlanTree::build(
            &join(
                "Hash Join",
                30.,
                vec![scan("Seq Scan", "a", "a", 10.), scan("Index Scan", "b", "bb", 5.)],
            ),
            "q",
        )
        .unwrap();
        let tables = CostTables::from_aqps(&[aqp]);

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out").join("costs.csv");
        write_records(&output, tables.records()).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines[0], "kind,relations,operator,cost");
        assert_eq!(lines.len(), 4);
        assert!(lines.contains(&"join,a b bb,Hash Join,15.0"));
    }

    #[test]
    fn test_read_query() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.sql");
        fs::write(&path, "select 1;").unwrap();
        assert_eq!(read_query(None, Some(path.clone())).unwrap(), "select 1;");
        assert_eq!(read_query(Some("select 2".to_string()), None).unwrap(), "select 2");
        assert!(read_query(None, None).is_err());
        assert!(read_query(Some("select 2".to_string()), Some(path)).is_err());
    }
}
