use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "API_LISTEN_ADDR",
        default_value = "0.0.0.0:8000",
        help = "HTTP API server listen address"
    )]
    pub api_listen_addr: String,

    #[arg(
        long,
        env = "PLATFORM_SIM_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily, e.g. /logs/platform-sim.log"
    )]
    pub log_file: Option<PathBuf>,

    #[arg(
        long,
        default_value = "3000",
        help = "Lower bound of the provisioning delay in milliseconds"
    )]
    pub provisioning_delay_min_ms: u64,

    #[arg(
        long,
        default_value = "8000",
        help = "Upper bound of the provisioning delay in milliseconds"
    )]
    pub provisioning_delay_max_ms: u64,

    #[arg(
        long,
        default_value = "2000",
        help = "Lower bound of each job stage delay in milliseconds"
    )]
    pub job_stage_delay_min_ms: u64,

    #[arg(
        long,
        default_value = "5000",
        help = "Upper bound of each job stage delay in milliseconds"
    )]
    pub job_stage_delay_max_ms: u64,

    #[arg(
        long,
        default_value = "2000",
        help = "Time an instance spends in terminating before removal, in milliseconds"
    )]
    pub termination_delay_ms: u64,

    #[arg(
        long,
        env = "JOB_FAILURE_PROBABILITY",
        default_value = "0.1",
        help = "Probability in [0, 1] that a job ends in failed"
    )]
    pub job_failure_probability: f64,

    #[arg(
        long,
        default_value = "30",
        help = "Seconds after submission at which a running job would reach 100% progress"
    )]
    pub progress_horizon_secs: u64,

    #[arg(
        long,
        default_value = "10000",
        help = "Number of metric samples retained in history"
    )]
    pub metrics_history_capacity: usize,

    #[arg(
        long,
        env = "PLATFORM_SIM_USERS_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "YAML file with additional user accounts"
    )]
    pub users_file: Option<PathBuf>,

    #[arg(
        long,
        help = "Seed demo instances and jobs for the default user",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub seed_demo_data: bool,
}
