use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use autovoicepack::{
    audit::find_oversized,
    config::GenerationConfig,
    effects,
    engines::xtts::{XttsServerEngine, XttsServerParams},
    pack::generate_voice_pack,
    validate,
};

/// Generate CrewChief voice packs with a cloned voice
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate every phrase of the inventory plus the radio check clips
    Generate(GenerateArgs),

    /// List clips much larger than the others in their directory
    Audit(AuditArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// JSON configuration file; flags given here override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Voice to clone, matching a folder in the baseline directory. Spaces are removed
    #[arg(long, value_parser = strip_spaces)]
    voice_name: Option<String>,

    /// The voice name as the engine should pronounce it, e.g. 'Luees' for 'Luis'
    #[arg(long)]
    voice_name_tts: Option<String>,

    /// Your name, spoken wherever the crew chief addresses you
    #[arg(long)]
    your_name: Option<String>,

    /// Additional variations per phrase; 0 disables variations
    #[arg(long)]
    variation_count: Option<u32>,

    /// Where the generated voice pack is written
    #[arg(long)]
    output_audio_dir: Option<PathBuf>,

    /// Directory holding one folder of reference recordings per voice
    #[arg(long)]
    baseline_audio_dir: Option<PathBuf>,

    /// CSV listing every phrase to generate
    #[arg(long)]
    phrase_inventory: Option<PathBuf>,

    /// Attempts per clip before giving up on it
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Speech speed multiplier
    #[arg(long)]
    speed: Option<f32>,

    /// Sampling temperature; drawn between 0.2 and 0.3 when omitted
    #[arg(long)]
    temperature: Option<f32>,

    /// Version recorded in CREATED_BY.txt; defaults to today's date
    #[arg(long)]
    voicepack_version: Option<String>,

    /// Root URL of the XTTS inference server
    #[arg(long)]
    synthesis_url: Option<String>,

    /// Validate with the integrity classifier instead of the heuristics
    #[arg(long)]
    use_model_validation: bool,

    /// Minimum classifier confidence for a clip to pass
    #[arg(long)]
    model_threshold: Option<f32>,

    /// Do not run the sox radio effects chain
    #[arg(long)]
    disable_audio_effects: bool,

    /// Do not apply the text replacement rules
    #[arg(long)]
    disable_text_replacements: bool,

    /// Keep the inventory order instead of shuffling it
    #[arg(long)]
    original_inventory_order: bool,

    /// Skip the inventory phrases
    #[arg(long)]
    skip_inventory: bool,

    /// Skip the radio check clips
    #[arg(long)]
    skip_radio_check: bool,

    /// Regenerate clips that already exist
    #[arg(long)]
    overwrite: bool,

    /// Keep rejected takes as *.invalid-N.wav instead of deleting them
    #[arg(long)]
    keep_invalid_files: bool,
}

#[derive(Args, Debug)]
struct AuditArgs {
    /// Voice pack directory to scan
    directory: PathBuf,

    /// How far above the directory average a clip must be, in percent
    percentage: f64,
}

fn strip_spaces(value: &str) -> Result<String, String> {
    Ok(value.replace(' ', ""))
}

impl GenerateArgs {
    fn into_config(self) -> Result<GenerationConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => GenerationConfig::from_json_file(path)?,
            None => GenerationConfig::default(),
        };

        if let Some(voice_name) = self.voice_name {
            config.voice_name = voice_name;
        }
        if self.voice_name_tts.is_some() {
            config.voice_name_tts = self.voice_name_tts;
        }
        if let Some(your_name) = self.your_name {
            config.your_name = your_name;
        }
        if let Some(count) = self.variation_count {
            config.variation_count = count;
        }
        if let Some(dir) = self.output_audio_dir {
            config.output_root = dir;
        }
        if let Some(dir) = self.baseline_audio_dir {
            config.baseline_dir = dir;
        }
        if let Some(path) = self.phrase_inventory {
            config.inventory_path = path;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if self.temperature.is_some() {
            config.temperature = self.temperature;
        }
        if self.voicepack_version.is_some() {
            config.voicepack_version = self.voicepack_version;
        }
        if let Some(url) = self.synthesis_url {
            config.synthesis_url = url;
        }
        if self.model_threshold.is_some() {
            config.validation.model_threshold = self.model_threshold;
        }

        config.validation.use_model |= self.use_model_validation;
        config.enable_audio_effects &= !self.disable_audio_effects;
        config.enable_text_replacements &= !self.disable_text_replacements;
        config.original_inventory_order |= self.original_inventory_order;
        config.skip_inventory |= self.skip_inventory;
        config.skip_radio_check |= self.skip_radio_check;
        config.overwrite |= self.overwrite;
        config.keep_invalid_files |= self.keep_invalid_files;
        Ok(config)
    }
}

fn generate(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;
    config.check()?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, stopping after the current phrase");
        handler_flag.store(true, Ordering::Relaxed);
    })?;

    let mut engine = XttsServerEngine::new(XttsServerParams {
        base_url: config.synthesis_url.clone(),
        timeout: Some(config.request_timeout()),
        ..Default::default()
    })?;
    let effects = effects::from_config(config.enable_audio_effects);
    let validator = validate::from_config(&config.validation, config.request_timeout())?;

    let started = Instant::now();
    let summary = generate_voice_pack(
        &config,
        &mut engine,
        effects.as_ref(),
        validator.as_ref(),
        &cancel,
        &mut rand::thread_rng(),
    )?;
    summary.log();
    log::info!("Finished in {:.1?}", started.elapsed());
    Ok(())
}

fn audit(args: AuditArgs) -> Result<(), Box<dyn std::error::Error>> {
    let groups = find_oversized(&args.directory, args.percentage)?;
    for group in &groups {
        println!("\nIn directory: {}", group.dir.display());
        println!(
            "Files larger than {}% above the average size ({:.0} bytes):",
            args.percentage, group.average_size
        );
        for file in &group.files {
            println!("{}", file.display());
        }
    }
    if groups.is_empty() {
        println!("No oversized files found");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Commands::Generate(args) => generate(args),
        Commands::Audit(args) => audit(args),
    }
}
