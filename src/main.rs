use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use spect_reorient::{
    app::{AppState, record_name},
    colormap::ColorMap,
    config::{RuntimeConfig, load_config},
    enums::View,
    persist::{self, upsert_reorientation, upsert_segment_scores},
    volume_loader::DicomSource,
};

use log::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let Some(config_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        error!("usage: spect-reorient <config.json>");
        return ExitCode::FAILURE;
    };

    match run(&config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let config = load_config(config_path)?;
    let source = DicomSource {
        target_range_mm: config.target_range_mm,
        ..Default::default()
    };
    let state = AppState::new(Box::new(source), config.execution)?;
    configure(&state, &config)?;

    state.open(&config.input_path)?;
    apply_reorientation(&state, &config)?;
    state.settled().await;

    write_outputs(&state, &config)?;
    Ok(())
}

fn configure(state: &AppState, config: &RuntimeConfig) -> Result<(), Box<dyn Error>> {
    state.clip_percentage.set(config.clip_percentage);
    state.sampling.apply(&config.sampling)?;
    state.polar_map.set_options(&config.polar_map);
    if let Some(path) = &config.colormap {
        state.polar_map.colormap.set(ColorMap::from_csv(path)?);
    }
    Ok(())
}

/// A table entry of the input wins over explicit parameters.
fn apply_reorientation(state: &AppState, config: &RuntimeConfig) -> Result<(), Box<dyn Error>> {
    if let (Some(table), Some(name)) = (&config.reorientation_table, record_name(&config.input_path)) {
        if let Some(record) = persist::find_reorientation(table, &name)? {
            info!("using reorientation of {name} from {}", table.display());
            state.import_reorientation(&record);
            return Ok(());
        }
        warn!("{name} not found in {}", table.display());
    }
    if let Some(parameters) = &config.reorientation {
        state.reorientation.set_parameters(parameters);
    }
    Ok(())
}

fn write_outputs(state: &AppState, config: &RuntimeConfig) -> Result<(), Box<dyn Error>> {
    let directory = &config.output.directory;
    fs::create_dir_all(directory)?;

    state
        .polar_map
        .image
        .with(|image| image.save(directory.join("polar_map.png")))?;
    state
        .polar_map
        .activity_image
        .with(|image| image.save(directory.join("radial_activities.png")))?;

    if config.output.view_images {
        for view in View::ALL {
            let path = directory.join(format!("{}.png", view.file_stem()));
            state.view(view).image.with(|image| image.save(&path))?;
        }
    }

    let scores = state.polar_map.scores.get();
    info!("segment scores: {scores}");
    if let Some(name) = record_name(&config.input_path) {
        upsert_segment_scores(directory.join("segment_scores.csv"), &name, &scores)?;
    }
    if let Some(record) = state.reorientation_record() {
        upsert_reorientation(directory.join("reorientation.csv"), &record)?;
    }
    persist::save_snapshot(directory.join("state.json"), &state.serialize())?;
    Ok(())
}
