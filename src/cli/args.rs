use clap::{ArgAction, Parser};
use crate::core::models::Profile;
use crate::core::scheduler::Selection;
use crate::plugins::registry::{DIR_BRUTEFORCE, SCREENSHOTS, SUBDOMAINS};
use crate::reporters::writer::ReportFormat;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "autoscope", version, about = "Staged, resumable reconnaissance pipeline")]
pub struct Cli {
    /// Target domain, IP address or CIDR range
    #[arg(short = 't', long = "target")]
    pub target: String,

    /// Stage profile
    #[arg(long = "profile", value_enum, default_value_t = Profile::Deep)]
    pub profile: Profile,

    /// Shorthand for --profile fast
    #[arg(long = "fast", action = ArgAction::SetTrue, conflicts_with_all = ["deep", "profile"])]
    pub fast: bool,

    /// Shorthand for --profile deep
    #[arg(long = "deep", action = ArgAction::SetTrue, conflicts_with = "profile")]
    pub deep: bool,

    /// Run exactly these stages, ignoring profile membership
    #[arg(long = "stages", value_delimiter = ',')]
    pub stages: Option<Vec<String>>,

    /// Run subdomain enumeration only
    #[arg(long = "only-subdomains", action = ArgAction::SetTrue, conflicts_with = "stages")]
    pub only_subdomains: bool,

    /// Skip directory brute-forcing
    #[arg(long = "no-dirs", action = ArgAction::SetTrue)]
    pub no_dirs: bool,

    /// Skip screenshots
    #[arg(long = "no-screenshots", action = ArgAction::SetTrue)]
    pub no_screenshots: bool,

    /// Continue from the workspace checkpoint
    #[arg(long = "resume", action = ArgAction::SetTrue)]
    pub resume: bool,

    /// Re-run stages the checkpoint marks completed
    #[arg(long = "force-rerun", action = ArgAction::SetTrue)]
    pub force_rerun: bool,

    /// Report format
    #[arg(long = "report", value_enum, default_value_t = ReportFormat::Md)]
    pub report: ReportFormat,

    /// Base directory for workspaces (overrides the configuration)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Verbose human output
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Debug logs (implies verbose)
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,
}

impl Cli {
    pub fn effective_profile(&self) -> Profile {
        if self.fast {
            Profile::Fast
        } else if self.deep {
            Profile::Deep
        } else {
            self.profile
        }
    }

    pub fn selection(&self) -> Selection {
        let only = if self.only_subdomains {
            Some(vec![SUBDOMAINS.to_string()])
        } else {
            self.stages
                .as_ref()
                .map(|list| list.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        };

        let mut exclude = Vec::new();
        if self.no_dirs {
            exclude.push(DIR_BRUTEFORCE.to_string());
        }
        if self.no_screenshots {
            exclude.push(SCREENSHOTS.to_string());
        }

        Selection {
            profile: self.effective_profile(),
            only,
            exclude,
        }
    }
}
