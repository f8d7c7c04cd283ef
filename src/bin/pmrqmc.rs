use clap::Parser;
use num_complex::Complex64;
use pmrqmc::binning::Summary;
use pmrqmc::config::SimulationParams;
use pmrqmc::pmr::hamiltonian::HamiltonianModel;
use pmrqmc::pmr::pauli::{PauliHamiltonian, PauliString};
use pmrqmc::simulation::{run_simulation, CancellationToken, RunReport};
use serde::Deserialize;
use std::error::Error;
use std::fs;

#[derive(Parser, Debug)]
#[command(version, about = "PMR quantum Monte Carlo for spin-1/2 Hamiltonians", long_about = None)]
struct Args {
    /// YAML file with `simulation` and `hamiltonian` sections.
    #[arg(short, long, default_value = "config.yml")]
    config: String,
    /// Number of independent replicas to run.
    #[arg(short, long, default_value_t = 1)]
    replicas: usize,
    /// Index of the replica to run when running a single one.
    #[arg(long, default_value_t = 0)]
    replica: usize,
    /// Print the reports as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Deserialize, Debug)]
struct ConfigFile {
    #[serde(default)]
    simulation: SimulationParams,
    hamiltonian: HamiltonianSection,
}

#[derive(Deserialize, Debug)]
struct HamiltonianSection {
    spins: usize,
    terms: Vec<TermEntry>,
}

#[derive(Deserialize, Debug)]
struct TermEntry {
    coefficient: f64,
    #[serde(default)]
    imaginary: f64,
    paulis: String,
}

impl HamiltonianSection {
    fn build(&self) -> Result<PauliHamiltonian, Box<dyn Error>> {
        let terms = self
            .terms
            .iter()
            .map(|t| {
                let string: PauliString = t.paulis.parse()?;
                Ok((Complex64::new(t.coefficient, t.imaginary), string))
            })
            .collect::<Result<Vec<_>, Box<dyn Error>>>()?;
        Ok(PauliHamiltonian::from_terms(self.spins, &terms)?)
    }
}

fn print_summary(summary: &Summary) {
    println!(
        "measurements: {}   <sign> = {:.6} +- {:.6}   <q> = {:.2}   max q = {}",
        summary.measurements,
        summary.sign.mean,
        summary.sign.error,
        summary.mean_length,
        summary.max_length
    );
    for o in &summary.observables {
        println!(
            "{:>16} = {:>14.8} +- {:.8}   (tau_int {:.2})",
            o.observable.name(),
            o.estimate.mean,
            o.estimate.error,
            o.autocorrelation_time
        );
    }
    for s in &summary.susceptibilities {
        println!(
            "{:>16} {:?} susceptibility = {:.8} +- {:.8}",
            s.integral.name(),
            s.kind,
            s.estimate.mean,
            s.estimate.error
        );
    }
}

fn print_report(report: &RunReport) {
    println!("replica {} (seed {})", report.replica, report.seed);
    println!(
        "updates: {} equilibration, {} production; {:.2}s{}{}",
        report.counters.equilibration_updates,
        report.counters.updates,
        report.elapsed.as_secs_f64(),
        if report.resumed { ", resumed" } else { "" },
        if report.completed { "" } else { ", unfinished" },
    );
    print_summary(&report.summary);
    if let Some(path) = &report.checkpoint {
        println!("checkpoint written to {}", path.display());
    }
}

#[cfg(feature = "parallel-replicas")]
fn run_all(
    params: &SimulationParams,
    ham: &PauliHamiltonian,
    args: &Args,
    cancel: &CancellationToken,
) -> Result<Vec<RunReport>, Box<dyn Error>> {
    if args.replicas > 1 {
        Ok(pmrqmc::replicas::run_replicas(params, ham, args.replicas, cancel)?)
    } else {
        Ok(vec![run_simulation(params, ham, args.replica, cancel)?])
    }
}

#[cfg(not(feature = "parallel-replicas"))]
fn run_all(
    params: &SimulationParams,
    ham: &PauliHamiltonian,
    args: &Args,
    cancel: &CancellationToken,
) -> Result<Vec<RunReport>, Box<dyn Error>> {
    if args.replicas > 1 {
        let reports = (0..args.replicas)
            .map(|r| run_simulation(params, ham, r, cancel))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    } else {
        Ok(vec![run_simulation(params, ham, args.replica, cancel)?])
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let text = fs::read_to_string(&args.config)?;
    let config: ConfigFile = serde_yaml::from_str(&text)?;
    let ham = config.hamiltonian.build()?;
    let params = config.simulation;
    params.validate()?;

    let cancel = CancellationToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel.flag())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())?;

    eprintln!(
        "{} spins, {} permutation terms, beta = {}, {} replica(s)",
        config.hamiltonian.spins,
        ham.num_terms(),
        params.beta,
        args.replicas.max(1)
    );
    let reports = run_all(&params, &ham, &args, &cancel)?;
    if cancel.is_cancelled() {
        eprintln!("interrupted");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        print_report(report);
    }
    if reports.len() > 1 {
        let summaries: Vec<Summary> = reports.iter().map(|r| r.summary.clone()).collect();
        if let Some(combined) = pmrqmc::binning::combine_summaries(&summaries) {
            println!("combined over {} replicas", reports.len());
            print_summary(&combined);
        }
    }
    Ok(())
}
