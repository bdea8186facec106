use anyhow::Result;
use clap::{Args, Subcommand};
use xshell::{Shell, cmd};

#[derive(Subcommand)]
pub enum Command {
    /// Build all workspace members
    Build(Build),
    /// Run CI checks (fmt, clippy, test)
    Ci(Ci),
    /// Apply rustfmt to all files
    Fmt(Fmt),
    /// Run tests
    Test(Test),
}

impl Command {
    pub fn run(self, sh: &Shell) -> Result<()> {
        match self {
            Command::Build(cmd) => cmd.run(sh),
            Command::Ci(cmd) => cmd.run(sh),
            Command::Fmt(cmd) => cmd.run(sh),
            Command::Test(cmd) => cmd.run(sh),
        }
    }
}

#[derive(Args)]
pub struct Build {
    #[arg(long, default_value = "dev")]
    profile: String,
}

impl Build {
    pub fn run(&self, sh: &Shell) -> Result<()> {
        let profile = &self.profile;
        cmd!(sh, "cargo build --workspace --profile {profile}").run()?;
        Ok(())
    }
}

#[derive(Args)]
pub struct Ci {}

impl Ci {
    pub fn run(&self, sh: &Shell) -> Result<()> {
        cmd!(sh, "cargo fmt --all --check").run()?;
        cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
        cmd!(sh, "cargo test --workspace").run()?;
        Ok(())
    }
}

#[derive(Args)]
pub struct Fmt {}

impl Fmt {
    pub fn run(&self, sh: &Shell) -> Result<()> {
        cmd!(sh, "cargo fmt --all").run()?;
        Ok(())
    }
}

#[derive(Args)]
pub struct Test {
    #[arg(long, default_value = "dev")]
    profile: String,
}

impl Test {
    pub fn run(&self, sh: &Shell) -> Result<()> {
        let profile = &self.profile;
        cmd!(sh, "cargo test --workspace --profile {profile}").run()?;
        Ok(())
    }
}
