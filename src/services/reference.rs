use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Where the reference CSV comes from.
pub trait ReferenceSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn Read + Send>>;
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReferenceSource for FileSource {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        Ok(Box::new(file))
    }
}

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    #[serde(rename = "Food name")]
    food_name: Option<String>,
    #[serde(rename = "Density")]
    density: Option<String>,
}

/// Known food densities (g/ml) keyed by normalized name.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    densities: HashMap<String, f64>,
    rendered: String,
}

const NAME_COLUMN: &str = "Food name";
const DENSITY_COLUMN: &str = "Density";

impl ReferenceTable {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .context("malformed reference dataset header")?;
        for column in [NAME_COLUMN, DENSITY_COLUMN] {
            if !headers.iter().any(|h| h == column) {
                anyhow::bail!("reference dataset has no '{}' column", column);
            }
        }

        let mut densities = HashMap::new();
        let mut lines = Vec::new();

        for row in csv_reader.deserialize::<ReferenceRow>() {
            let row = row.context("malformed reference dataset")?;

            let (Some(raw_name), Some(raw_density)) = (row.food_name, row.density) else {
                continue;
            };

            let food_name = normalize_reference_name(&raw_name);
            let density_str = raw_density.trim();

            // Category headers look like "Fruits," in the name column
            if food_name.is_empty() || food_name.ends_with(',') || density_str.is_empty() {
                continue;
            }

            match parse_density(density_str) {
                Some(density) => {
                    log::debug!("Added density for {}: {}", food_name, density);
                    lines.push(format!("{}: {:?} g/ml", food_name, density));
                    densities.insert(food_name, density);
                }
                None => {
                    log::debug!("Failed to parse density '{}' for {}", density_str, food_name);
                }
            }
        }

        Ok(Self {
            densities,
            rendered: lines.join("\n"),
        })
    }

    pub fn get(&self, normalized_name: &str) -> Option<f64> {
        self.densities.get(normalized_name).copied()
    }

    pub fn len(&self) -> usize {
        self.densities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.densities.is_empty()
    }

    /// One `name: value g/ml` line per accepted row.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}

fn normalize_reference_name(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_lowercase()
}

/// Plain float, or the midpoint of a `low-high` range.
pub fn parse_density(value: &str) -> Option<f64> {
    if value.contains('-') {
        let parts: Vec<&str> = value.split('-').collect();
        let [low, high] = parts.as_slice() else {
            return None;
        };
        let low = low.trim().parse::<f64>().ok()?;
        let high = high.trim().parse::<f64>().ok()?;
        Some((low + high) / 2.0)
    } else {
        value.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Lazily loaded, process-lifetime reference table.
///
/// The first caller reads the dataset; concurrent first callers wait for that
/// single load. A failed load is remembered as `None` as well.
pub struct DensityReference {
    source: Arc<dyn ReferenceSource>,
    table: OnceCell<Option<Arc<ReferenceTable>>>,
}

impl DensityReference {
    pub fn new(source: Box<dyn ReferenceSource>) -> Self {
        Self {
            source: Arc::from(source),
            table: OnceCell::new(),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FileSource::new(path)))
    }

    pub async fn load(&self) -> Option<Arc<ReferenceTable>> {
        self.table
            .get_or_init(|| async {
                // File IO and CSV parsing stay off the async workers
                let source = self.source.clone();
                match tokio::task::spawn_blocking(move || read_table(source.as_ref())).await {
                    Ok(table) => table,
                    Err(e) => {
                        log::error!("❌ Reference loading task failed: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

fn read_table(source: &dyn ReferenceSource) -> Option<Arc<ReferenceTable>> {
    let table = source
        .open()
        .and_then(|reader| ReferenceTable::from_reader(reader));

    match table {
        Ok(table) => {
            log::info!("📚 Loaded {} reference density values", table.len());
            Some(Arc::new(table))
        }
        Err(e) => {
            log::error!("❌ Failed to load reference file: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const SAMPLE_CSV: &str = "Food name,Density\n\
        \"Fruits,\",\n\
        Apple,0.853\n\
        \"  Rice, cooked \",0.56-0.72\n\
        Milk,1.03\n\
        Honey,\n\
        Mystery,n/a\n\
        ,0.5\n";

    pub(crate) struct CountingSource {
        pub data: &'static str,
        pub reads: Arc<AtomicUsize>,
    }

    impl ReferenceSource for CountingSource {
        fn open(&self) -> Result<Box<dyn Read + Send>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Cursor::new(self.data.as_bytes())))
        }
    }

    #[test]
    fn test_parse_density() {
        assert!((parse_density("0.56-0.72").unwrap() - 0.64).abs() < 1e-12);
        assert_eq!(parse_density("0.90"), Some(0.9));
        assert_eq!(parse_density("abc"), None);
        assert_eq!(parse_density("0.1-0.2-0.3"), None);
        assert_eq!(parse_density("0.5-"), None);
    }

    #[test]
    fn test_table_from_reader() {
        let table = ReferenceTable::from_reader(Cursor::new(SAMPLE_CSV)).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get("apple"), Some(0.853));
        assert_eq!(table.get("milk"), Some(1.03));
        assert!((table.get("rice, cooked").unwrap() - 0.64).abs() < 1e-12);
        // Category header, empty density, bad density and empty name are all skipped
        assert_eq!(table.get("fruits,"), None);
        assert_eq!(table.get("honey"), None);
        assert_eq!(table.get("mystery"), None);

        let lines: Vec<&str> = table.rendered().lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "apple: 0.853 g/ml");
        assert!(lines[1].starts_with("rice, cooked: 0.64"));
        assert_eq!(lines[2], "milk: 1.03 g/ml");
    }

    #[test]
    fn test_table_requires_both_columns() {
        let err = ReferenceTable::from_reader(Cursor::new("Name,Value\nApple,0.853\n")).unwrap_err();
        assert!(err.to_string().contains("'Food name'"));

        let err = ReferenceTable::from_reader(Cursor::new("Food name,Weight\nApple,0.853\n")).unwrap_err();
        assert!(err.to_string().contains("'Density'"));
    }

    #[test]
    fn test_malformed_row_fails_the_load() {
        let bytes: &[u8] = b"Food name,Density\nApple,0.853\n\xff\xfe,0.5\n";
        let err = ReferenceTable::from_reader(Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("malformed reference dataset"));
    }

    #[tokio::test]
    async fn test_wrong_columns_are_absent_and_memoized() {
        let reads = Arc::new(AtomicUsize::new(0));
        let reference = DensityReference::new(Box::new(CountingSource {
            data: "Name,Value\nApple,0.853\n",
            reads: reads.clone(),
        }));

        assert!(reference.load().await.is_none());
        assert!(reference.load().await.is_none());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_is_memoized() {
        let reads = Arc::new(AtomicUsize::new(0));
        let reference = DensityReference::new(Box::new(CountingSource {
            data: SAMPLE_CSV,
            reads: reads.clone(),
        }));

        let first = reference.load().await.unwrap();
        let second = reference.load().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_load_reads_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let reference = Arc::new(DensityReference::new(Box::new(CountingSource {
            data: SAMPLE_CSV,
            reads: reads.clone(),
        })));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reference = reference.clone();
                tokio::spawn(async move { reference.load().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let reference = DensityReference::from_path("/nonexistent/food_density_reference.csv");
        assert!(reference.load().await.is_none());
        assert!(reference.load().await.is_none());
    }
}
