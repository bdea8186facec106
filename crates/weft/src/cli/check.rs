use anyhow::Result;
use clap::Args;
use std::{fs, path::PathBuf};
use weft_core::Toolpath;

#[derive(Args)]
pub struct CheckArgs {
    /// Toolpath files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        let mut failed = 0usize;
        for path in &self.files {
            let display = path.display();
            let input = match fs::read_to_string(path) {
                Ok(s) => s,
                Err(err) => {
                    eprintln!("{display}: read error: {err}");
                    failed += 1;
                    continue;
                }
            };

            match Toolpath::parse(&input) {
                Ok(toolpath) => {
                    println!(
                        "OK {display}: {} layers, {} segments",
                        toolpath.layers().len(),
                        toolpath.segments().len()
                    );
                }
                Err(err) => {
                    println!("ERR {display}: {err}");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("{failed} file(s) failed validation");
        }
        Ok(())
    }
}
