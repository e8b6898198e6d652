use anyhow::Result;

pub mod config;
pub mod feedback;
pub mod runner;
pub mod session;
pub mod testbench;
pub mod transform;

pub fn run(cli: config::Cli) -> Result<()> {
    let settings = config::Settings::from_cli(&cli)?;
    let interpreter = runner::interpreter_path(&settings.python)?;
    let benches = testbench::read_testbench(&cli.testbench)?;

    let mut reports = Vec::new();
    for file in &cli.files {
        let (name, bench) = testbench::select_bench(&benches, cli.bench.as_deref(), file)?;
        reports.push(session::handle_assignment(
            file, name, bench, &interpreter, &settings,
        )?);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    Ok(())
}
