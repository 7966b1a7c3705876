pub mod ai;
pub mod capture;
pub mod geometry;
pub mod session;
pub mod settings;
pub mod speech;

use std::path::Path;
use std::sync::Arc;

use ai::azure_oracle::AzureOracleClient;
use capture::camera::{LocalDevices, StillImageCamera};
use session::{RepairSession, SessionConfig, SessionState};
use settings::Settings;
use speech::LogSpeech;

/// Headless run: diagnose the object in a photo and print the repair plan.
///
/// The photo stands in for the live camera; spoken feedback goes to the log.
pub async fn run(image_path: &Path, settings: Settings) -> Result<(), String> {
    if !settings.is_configured() {
        return Err(format!(
            "Oracle endpoint and API key are not set. Edit {} or set AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_API_KEY.",
            settings::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "the settings file".into())
        ));
    }

    let camera = StillImageCamera::open(image_path).map_err(|e| e.to_string())?;
    let devices = Arc::new(LocalDevices::new(Arc::new(camera), false));
    let transport = Arc::new(AzureOracleClient::from_settings(&settings));
    let session = RepairSession::new(
        devices,
        transport,
        Arc::new(LogSpeech),
        SessionConfig::from_settings(&settings),
    );

    session.start().await.map_err(|e| e.to_string())?;
    session.scan().await.map_err(|e| e.to_string())?;

    let snapshot = session.snapshot();
    if snapshot.state != SessionState::RepairGuide {
        return Err(format!("No plan produced (session is {})", snapshot.state));
    }
    let plan = snapshot
        .plan
        .ok_or_else(|| "No plan produced".to_string())?;

    println!("{}: {}", plan.object_name, plan.issue_diagnosis);
    for step in &plan.steps {
        println!("\n{}. {}", step.id, step.title);
        println!("   {}", step.instruction);
        if let Some(tool) = &step.tool_needed {
            println!("   Tool: {}", tool);
        }
        if let Some(warning) = &step.safety_warning {
            println!("   Caution: {}", warning);
        }
    }

    if let Some(cue) = session.overlay(1920.0, 1080.0) {
        log::info!(
            "Step 1 cue: {:?} at ({:.0}, {:.0}) {:.0}x{:.0} on a 1920x1080 view",
            cue.kind,
            cue.rect.left,
            cue.rect.top,
            cue.rect.width,
            cue.rect.height
        );
    }

    session.shutdown();
    Ok(())
}
