//! The three pipeline stages, and a [`Pipeline`] which runs them in order.
//!
//! Stages only talk to each other through blobs named after the run date.

use chrono::NaiveDate;
use std::{fmt, str::FromStr};
use tokio::fs;

use crate::common::*;
use crate::config::PipelineConfig;
use crate::delimited::{ColumnNames, ParseOptions};
use crate::http::{FetchRequest, Fetcher};
use crate::ops::{http_to_store, store_to_local_file, store_to_table};
use crate::temporary::TemporaryFiles;

/// Columns returned by the Census batch geocoder. The response has no header
/// row, so we supply these names when loading it.
pub const CENSUS_RESULT_COLUMNS: &[&str] = &[
    "address_id",
    "input_address",
    "match_indicator",
    "match_type",
    "matched_address",
    "coordinates",
    "tiger_line_id",
    "tiger_line_side",
    "state_fips",
    "county_fips",
    "tract",
    "block",
];

/// Form fields sent to the geocoder along with the address file.
const GEOCODER_FORM_FIELDS: &[(&str, &str)] = &[
    ("benchmark", "Public_AR_Current"),
    ("vintage", "Current_Current"),
];

/// The blob holding raw addresses for `date`.
pub fn raw_addresses_blob(bucket: &str, date: NaiveDate) -> Result<BlobName> {
    BlobName::new(bucket, format!("addresses_{}.csv", date.format("%Y-%m-%d")))
}

/// The blob holding geocoder output for `date`.
pub fn geocoded_addresses_blob(bucket: &str, date: NaiveDate) -> Result<BlobName> {
    BlobName::new(
        bucket,
        format!("geocoded_address_results_{}.csv", date.format("%Y-%m-%d")),
    )
}

/// One unit of scheduled work. Everything a stage needs is supplied when it
/// is constructed.
#[async_trait]
pub trait Stage: fmt::Debug + Send + Sync {
    /// The name a scheduler uses for this stage.
    fn name(&self) -> &'static str;

    /// Do the work.
    async fn run(&self) -> Result<()>;
}

/// The stages we know about, in the order they run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StageName {
    ExtractRawAddresses,
    ExtractGeocodedAddresses,
    LoadAddressData,
}

impl StageName {
    pub const ALL: &'static [StageName] = &[
        StageName::ExtractRawAddresses,
        StageName::ExtractGeocodedAddresses,
        StageName::LoadAddressData,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::ExtractRawAddresses => "extract_raw_addresses",
            StageName::ExtractGeocodedAddresses => "extract_geocoded_addresses",
            StageName::LoadAddressData => "load_address_data",
        }
    }

    /// Does this stage write to the database?
    pub fn needs_database(self) -> bool {
        self == StageName::LoadAddressData
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for StageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StageName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| {
                let known = StageName::ALL.iter().map(|n| n.as_str()).collect::<Vec<_>>();
                format_err!("unknown stage {:?} (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Things every stage shares.
#[derive(Clone, Debug)]
pub struct StageContext {
    pub store: Arc<dyn BlobStore>,
    pub fetcher: Fetcher,
    pub temporaries: TemporaryFiles,
    pub bucket: String,
    pub date: NaiveDate,
}

impl StageContext {
    /// Build a context from `config`, for the run on `date`.
    pub fn new(
        config: &PipelineConfig,
        date: NaiveDate,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        Ok(StageContext {
            store,
            fetcher: Fetcher::new(config.status_policy, config.http_timeout)?,
            temporaries: TemporaryFiles::new(config.temporary_dir.clone()),
            bucket: config.bucket.clone(),
            date,
        })
    }
}

/// Stage 1: download the day's addresses and store them.
#[derive(Debug)]
pub struct DownloadAddresses {
    ctx: StageContext,
    source_url: Url,
}

impl DownloadAddresses {
    pub fn new(ctx: StageContext, source_url: Url) -> Self {
        DownloadAddresses { ctx, source_url }
    }
}

#[async_trait]
impl Stage for DownloadAddresses {
    fn name(&self) -> &'static str {
        StageName::ExtractRawAddresses.as_str()
    }

    #[instrument(level = "info", name = "extract_raw_addresses", skip(self), fields(date = %self.ctx.date))]
    async fn run(&self) -> Result<()> {
        let dest = raw_addresses_blob(&self.ctx.bucket, self.ctx.date)?;
        let request = FetchRequest::get(self.source_url.clone())?;
        http_to_store(
            &self.ctx.fetcher,
            &request,
            self.ctx.store.as_ref(),
            &dest,
            &self.ctx.temporaries,
        )
        .await?;
        Ok(())
    }
}

/// Stage 2: send the stored addresses to the geocoder and store its answer.
#[derive(Debug)]
pub struct GeocodeAddresses {
    ctx: StageContext,
    geocoder_url: Url,
}

impl GeocodeAddresses {
    pub fn new(ctx: StageContext, geocoder_url: Url) -> Self {
        GeocodeAddresses { ctx, geocoder_url }
    }
}

#[async_trait]
impl Stage for GeocodeAddresses {
    fn name(&self) -> &'static str {
        StageName::ExtractGeocodedAddresses.as_str()
    }

    #[instrument(level = "info", name = "extract_geocoded_addresses", skip(self), fields(date = %self.ctx.date))]
    async fn run(&self) -> Result<()> {
        let source = raw_addresses_blob(&self.ctx.bucket, self.ctx.date)?;
        let dest = geocoded_addresses_blob(&self.ctx.bucket, self.ctx.date)?;

        let local_path = store_to_local_file(
            self.ctx.store.as_ref(),
            &source,
            None,
            &self.ctx.temporaries,
        )
        .await?;
        let addresses = fs::read(&local_path)
            .await
            .with_context(|| format!("could not read {}", local_path.display()))?;

        let mut request = FetchRequest::post(self.geocoder_url.clone())?;
        for &(key, value) in GEOCODER_FORM_FIELDS {
            request = request.form_field(key, value);
        }
        let request = request.file("addressFile", "input.csv", Bytes::from(addresses));

        let result = http_to_store(
            &self.ctx.fetcher,
            &request,
            self.ctx.store.as_ref(),
            &dest,
            &self.ctx.temporaries,
        )
        .await;
        if let Err(err) = fs::remove_file(&local_path).await {
            warn!("could not remove {}: {}", local_path.display(), err);
        }
        result?;
        Ok(())
    }
}

/// Stage 3: replace the destination table with the geocoded results.
#[derive(Debug)]
pub struct LoadAddresses {
    ctx: StageContext,
    db: Arc<dyn Database>,
    table: TableName,
}

impl LoadAddresses {
    pub fn new(ctx: StageContext, db: Arc<dyn Database>, table: TableName) -> Self {
        LoadAddresses { ctx, db, table }
    }
}

#[async_trait]
impl Stage for LoadAddresses {
    fn name(&self) -> &'static str {
        StageName::LoadAddressData.as_str()
    }

    #[instrument(level = "info", name = "load_address_data", skip(self), fields(date = %self.ctx.date, table = %self.table))]
    async fn run(&self) -> Result<()> {
        let source = geocoded_addresses_blob(&self.ctx.bucket, self.ctx.date)?;
        let opt = ParseOptions::with_column_names(ColumnNames::explicit(
            CENSUS_RESULT_COLUMNS.iter().copied(),
        ));
        let rows = store_to_table(
            self.ctx.store.as_ref(),
            &source,
            self.db.as_ref(),
            &self.table,
            &opt,
            &self.ctx.temporaries,
        )
        .await?;
        info!("loaded {} geocoded addresses into {}", rows, self.table);
        Ok(())
    }
}

/// Build a single stage. `db` is only required by stages which write to the
/// database.
pub fn build_stage(
    name: StageName,
    config: &PipelineConfig,
    ctx: StageContext,
    db: Option<Arc<dyn Database>>,
) -> Result<Box<dyn Stage>> {
    Ok(match name {
        StageName::ExtractRawAddresses => {
            Box::new(DownloadAddresses::new(ctx, config.source_url.clone()))
        }
        StageName::ExtractGeocodedAddresses => {
            Box::new(GeocodeAddresses::new(ctx, config.geocoder_url.clone()))
        }
        StageName::LoadAddressData => {
            let db = db.ok_or_else(|| format_err!("stage {} needs a database", name))?;
            Box::new(LoadAddresses::new(ctx, db, config.table.clone()))
        }
    })
}

/// All our stages, run strictly in order.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// The standard three-stage pipeline for `date`.
    pub fn new(
        config: &PipelineConfig,
        date: NaiveDate,
        store: Arc<dyn BlobStore>,
        db: Arc<dyn Database>,
    ) -> Result<Self> {
        let ctx = StageContext::new(config, date, store)?;
        let stages = StageName::ALL
            .iter()
            .map(|&name| build_stage(name, config, ctx.clone(), Some(db.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }

    /// A pipeline running `stages` in the order given.
    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Pipeline { stages }
    }

    /// Our stages, in order.
    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    /// Look up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&dyn Stage> {
        self.stages
            .iter()
            .find(|stage| stage.name() == name)
            .map(|stage| stage.as_ref())
    }

    /// Run every stage in order, stopping at the first failure.
    #[instrument(level = "info", name = "pipeline", skip(self))]
    pub async fn run(&self) -> Result<()> {
        for stage in &self.stages {
            info!("running stage {}", stage.name());
            stage
                .run()
                .await
                .with_context(|| format!("stage {} failed", stage.name()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn blob_names_include_the_date() {
        let date = NaiveDate::from_ymd_opt(2021, 10, 22).unwrap();
        assert_eq!(
            raw_addresses_blob("b", date).unwrap().to_string(),
            "gs://b/addresses_2021-10-22.csv"
        );
        assert_eq!(
            geocoded_addresses_blob("b", date).unwrap().to_string(),
            "gs://b/geocoded_address_results_2021-10-22.csv"
        );
    }

    #[test]
    fn stage_names_round_trip() {
        for &name in StageName::ALL {
            assert_eq!(name.as_str().parse::<StageName>().unwrap(), name);
        }
        assert!("extract".parse::<StageName>().is_err());
    }

    /// Records that it ran, then succeeds or fails.
    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(format_err!("{} broke", self.name))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn pipeline_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(vec![]));
        let stage = |name: &'static str, fail: bool| -> Box<dyn Stage> {
            Box::new(Recorder {
                name,
                fail,
                log: log.clone(),
            })
        };
        let pipeline = Pipeline::from_stages(vec![
            stage("one", false),
            stage("two", true),
            stage("three", false),
        ]);
        assert!(pipeline.stage("two").is_some());
        assert!(pipeline.stage("four").is_none());

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.to_string(), "stage two failed");
        assert_eq!(*log.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn standard_pipeline_has_three_stages_in_order() {
        let config = PipelineConfig::new("bucket").unwrap();
        let date = NaiveDate::from_ymd_opt(2021, 10, 22).unwrap();
        let pipeline = Pipeline::new(
            &config,
            date,
            Arc::new(crate::MemoryStore::new()),
            Arc::new(crate::MemoryDatabase::new()),
        )
        .unwrap();
        let names = pipeline.stages().iter().map(|s| s.name()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "extract_raw_addresses",
                "extract_geocoded_addresses",
                "load_address_data"
            ]
        );
    }
}
