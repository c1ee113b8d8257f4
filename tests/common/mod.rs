use license_autoid::client::memory::{Fixture, InMemoryClient};
use license_autoid::engine::{Engine, EngineOptions, RunReport};
use license_autoid::error::EngineError;
use license_autoid::models::CandidateMatch;
use license_autoid::strategy::IdentificationStrategy;

/// Five files `/f1.c` … `/f5.c`, each with one pending match.
pub fn five_files() -> Fixture {
    let mut fixture = Fixture::new("p-1", "demo");
    for i in 1..=5 {
        let path = format!("/f{i}.c");
        fixture = fixture
            .file(&path)
            .candidate(CandidateMatch::new(&path, format!("c-{i}"), 60 + i as u8));
    }
    fixture
}

pub async fn start_engine(
    fixture: Fixture,
    strategy: Box<dyn IdentificationStrategy>,
    options: EngineOptions,
) -> Engine<InMemoryClient> {
    Engine::new(InMemoryClient::new(fixture), strategy, "demo", options)
        .await
        .expect("engine starts")
}

pub async fn run_engine(
    fixture: Fixture,
    strategy: Box<dyn IdentificationStrategy>,
    options: EngineOptions,
) -> (Engine<InMemoryClient>, Result<RunReport, EngineError>) {
    let mut engine = start_engine(fixture, strategy, options).await;
    let result = engine.run().await;
    (engine, result)
}

pub fn paths(engine: &Engine<InMemoryClient>) -> Vec<String> {
    engine
        .identifications_made()
        .iter()
        .map(|r| r.path.clone())
        .collect()
}
