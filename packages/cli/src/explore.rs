//! Interactive dataset inspection and playback.
//!
//! Datasets are read through the mirror proxy (or any server exposing the
//! same paths) at `COVID_MAP_DATA_URL`, or straight from a mirror's data
//! directory when `COVID_MAP_DATA_DIR` is set.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use covid_map_dataset::{DatasetStore, StoreConfig};
use covid_map_playback::{DEFAULT_FRAME_RATE, Frame, PlaybackController, format_date, frame_at};
use covid_map_proxy_models::ProxyConfig;
use covid_map_series_models::{
    CountyFips, Dataset, DatasetIdentity, Quantity, Representation, Scale, TrailingWindow,
};
use covid_map_source::{DatasetSource, DirectorySource, HttpSource};
use dialoguer::{Input, Select};
use indicatif::MultiProgress;

use crate::progress::{PlaybackBar, loading_spinner};

/// Environment variable holding the base URL datasets are fetched from.
pub const DATA_URL_ENV: &str = "COVID_MAP_DATA_URL";

/// Base URL used when [`DATA_URL_ENV`] is unset.
pub const DEFAULT_DATA_URL: &str = "http://127.0.0.1:8888";

/// Environment variable naming a local mirror data root. Takes precedence
/// over [`DATA_URL_ENV`].
pub const DATA_DIR_ENV: &str = "COVID_MAP_DATA_DIR";

/// Number of counties listed by [`inspect`].
const TOP_COUNTIES: usize = 10;

/// A source reading each resource from `base_url` at the path the proxy
/// serves it under.
#[must_use]
pub fn data_source(base_url: &str, config: &ProxyConfig) -> HttpSource {
    HttpSource::with_base_url(
        base_url,
        config
            .resources
            .iter()
            .map(|r| (r.resource, r.path.as_str())),
    )
}

/// A source reading each resource from the file a mirror rooted at `dir`
/// stores it in.
#[must_use]
pub fn local_source(dir: impl Into<PathBuf>, config: &ProxyConfig) -> DirectorySource {
    let file_names: BTreeMap<_, _> = config
        .resources
        .iter()
        .map(|r| (r.resource, r.path.clone()))
        .collect();
    DirectorySource::new(dir, file_names)
}

/// The `n` counties with the highest values in `frame`, highest first.
/// `NaN` values are skipped.
#[must_use]
pub fn top_counties(frame: &Frame, n: usize) -> Vec<(&CountyFips, f64)> {
    let mut ranked: Vec<_> = frame
        .values
        .iter()
        .filter(|(_, value)| !value.is_nan())
        .map(|(fips, value)| (fips, *value))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);
    ranked
}

fn store() -> Result<DatasetStore, Box<dyn std::error::Error>> {
    let config = covid_map_proxy::config::default_config()?;

    let source: Arc<dyn DatasetSource> = if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        let dir = PathBuf::from(dir);
        log::info!("Reading datasets from {}", dir.display());
        Arc::new(local_source(dir, &config))
    } else {
        let base_url =
            std::env::var(DATA_URL_ENV).unwrap_or_else(|_| DEFAULT_DATA_URL.to_string());
        log::info!("Reading datasets from {base_url}");
        Arc::new(data_source(&base_url, &config))
    };

    Ok(DatasetStore::new(source, StoreConfig::from_env()))
}

fn select<T: Copy + std::fmt::Display>(
    prompt: &str,
    options: &[T],
) -> Result<T, dialoguer::Error> {
    let labels: Vec<String> = options.iter().map(ToString::to_string).collect();
    let idx = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(options[idx])
}

fn prompt_identity() -> Result<DatasetIdentity, dialoguer::Error> {
    let quantity = select("Quantity", Quantity::ALL)?;
    let representation = select("Representation", Representation::ALL)?;
    let scale = select("Scale", Scale::ALL)?;
    let window: u32 = Input::new()
        .with_prompt("Trailing average window (days)")
        .default(1)
        .validate_with(|size: &u32| {
            TrailingWindow::new(*size)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    let window = TrailingWindow::new(window).unwrap_or_default();
    Ok(DatasetIdentity::new(quantity, representation, scale, window))
}

async fn load(
    multi: &MultiProgress,
    store: &DatasetStore,
    identity: DatasetIdentity,
) -> Result<Arc<Dataset>, Box<dyn std::error::Error>> {
    let spinner = loading_spinner(multi, &format!("Loading {identity}..."));
    let result = store.get_dataset(identity).await;
    spinner.finish_and_clear();
    Ok(result?)
}

/// Prompts for a dataset, loads it, and prints a summary of its last date.
///
/// # Errors
///
/// Returns an error if a prompt fails or the dataset cannot be loaded.
pub async fn inspect(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let store = store()?;
    let identity = prompt_identity()?;
    let dataset = load(multi, &store, identity).await?;

    println!();
    println!("Dataset:  {identity}");
    println!("Counties: {}", dataset.county_count());
    match (dataset.dates.first(), dataset.dates.last()) {
        (Some(first), Some(last)) => println!(
            "Dates:    {} - {} ({} days)",
            format_date(*first),
            format_date(*last),
            dataset.date_count()
        ),
        _ => println!("Dates:    none"),
    }

    if let Some(frame) = dataset
        .date_count()
        .checked_sub(1)
        .and_then(|last| frame_at(&dataset, last))
    {
        println!();
        println!("Top counties on {}:", format_date(frame.date));
        for (rank, (fips, value)) in top_counties(&frame, TOP_COUNTIES).iter().enumerate() {
            println!("  {:>2}. {fips}  {value:.4}", rank + 1);
        }
    }

    Ok(())
}

/// Prompts for a dataset and a frame rate, then plays it as a progress bar.
///
/// # Errors
///
/// Returns an error if a prompt fails, the dataset cannot be loaded, or
/// the playback task panics.
pub async fn play(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let store = store()?;
    let identity = prompt_identity()?;
    let frame_rate: u32 = Input::new()
        .with_prompt("Frames per second")
        .default(DEFAULT_FRAME_RATE.get())
        .validate_with(|rate: &u32| {
            if *rate > 0 {
                Ok(())
            } else {
                Err("frame rate must be positive")
            }
        })
        .interact_text()?;
    let frame_rate = NonZeroU32::new(frame_rate).unwrap_or(DEFAULT_FRAME_RATE);

    let dataset = load(multi, &store, identity).await?;
    let sink = PlaybackBar::new(multi, identity, dataset.date_count());
    let bar = sink.handle();

    let controller = PlaybackController::new();
    let outcome = controller.play(dataset, frame_rate, sink).await?;

    bar.finish();
    log::info!("Playback finished: {outcome:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use covid_map_series_models::{Quantity, Resource};

    use super::*;

    #[test]
    fn data_source_uses_proxy_paths() {
        let config = covid_map_proxy::config::default_config().unwrap();
        let source = data_source("http://localhost:8888/", &config);
        assert_eq!(
            source.url(Resource::Deaths),
            Some("http://localhost:8888/proxy_data/cumulative_deaths.csv")
        );
    }

    #[tokio::test]
    async fn local_source_reads_mirrored_files() {
        let config = covid_map_proxy::config::default_config().unwrap();
        let root = std::env::temp_dir().join("covid_map_cli_test_local_source");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join("proxy_data")).unwrap();
        std::fs::write(
            root.join("proxy_data/cumulative_cases.csv"),
            "countyFIPS,County Name,State,StateFIPS,1/22/20,1/23/20\n\
             1001,Autauga County,AL,1,2,5\n",
        )
        .unwrap();

        let store = DatasetStore::new(
            Arc::new(local_source(&root, &config)),
            StoreConfig::default(),
        );
        let dataset = store
            .get_dataset(DatasetIdentity::base(Quantity::Cases))
            .await
            .unwrap();

        assert_eq!(
            dataset.county(&CountyFips::parse("01001").unwrap()).unwrap(),
            &[2.0, 5.0]
        );
        assert!(
            store
                .get_dataset(DatasetIdentity::base(Quantity::Deaths))
                .await
                .is_err()
        );

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn top_counties_are_ranked_descending() {
        let values: BTreeMap<_, _> = [
            ("01001", 2.0),
            ("01003", 9.0),
            ("01005", f64::NAN),
            ("01007", 5.0),
        ]
        .into_iter()
        .map(|(fips, value)| (CountyFips::parse(fips).unwrap(), value))
        .collect();
        let frame = Frame {
            index: 0,
            date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            values,
        };

        let top: Vec<_> = top_counties(&frame, 2)
            .into_iter()
            .map(|(fips, _)| fips.as_str().to_string())
            .collect();
        assert_eq!(top, vec!["01003", "01007"]);
        assert_eq!(top_counties(&frame, 10).len(), 3);
    }
}
