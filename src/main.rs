// end-to-end demo: one session, simulated arrivals and rounds

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simple_logger::SimpleLogger;

use fd_core::{
    ArrivalDisposition, GroupPhase, ParticipantId, Role, RoundProgress, Session, SessionConfig,
};

fn main() {
    SimpleLogger::new().init().unwrap();

    info!("starting");

    let mut seed = [0u8; 32];
    rand::thread_rng().fill(&mut seed);
    let mut rng = StdRng::from_seed(seed);

    let config = SessionConfig::default();
    let num_rounds = config.num_rounds;
    let mut session = match Session::new(config, &mut rng) {
        Ok(s) => s,
        Err(e) => {
            log::error!("session setup failed: {}", e);
            std::process::exit(1);
        }
    };

    // lobby: people trickle in until the group forms; a few stragglers
    // afterwards demonstrate the overflow path
    let mut members: Vec<ParticipantId> = Vec::new();
    let mut arrivals = 0;
    while session.phase() == GroupPhase::Waiting && arrivals < 50 {
        arrivals += 1;
        let arrival = session.arrive(&format!("demo-{}", arrivals), &mut rng);
        info!(
            "arrival {} -> {:?} as {}",
            arrival.participant,
            arrival.disposition,
            arrival.role.label()
        );
    }
    if session.phase() != GroupPhase::Formed {
        log::error!("lobby drained before the group formed");
        std::process::exit(1);
    }
    for late in 0..2 {
        let arrival = session.arrive(&format!("demo-late-{}", late), &mut rng);
        assert_eq!(arrival.disposition, ArrivalDisposition::Overflow);
    }

    for node in 0..session.spec().len() {
        if let Some(p) = session.participant_at(node) {
            members.push(p.id);
            info!(
                "node {} (degree {}): participant {} [{}]",
                node,
                session.spec().degree(node),
                p.id,
                p.role.label()
            );
        }
    }

    // rounds: everyone follows their private preference, with occasional
    // majority players experimenting with Blue; one player goes silent
    // halfway through
    let silent_after = num_rounds / 2;
    let silent_member = members[members.len() - 1];

    for round in 1..=num_rounds {
        if session.failed() {
            info!("group failed before round {}; stopping", round);
            break;
        }
        let number = match session.begin_round() {
            Ok(n) => n,
            Err(e) => {
                info!("no further rounds: {}", e);
                break;
            }
        };

        let mut progress = RoundProgress::Pending { awaiting: members.len() };
        for &id in &members {
            let participant = match session.participant(id) {
                Some(p) => p.clone(),
                None => continue,
            };
            if participant.is_dropout {
                continue;
            }

            progress = if id == silent_member && round > silent_after {
                session.note_timeout(id, &mut rng).unwrap()
            } else {
                let mut choice = participant.role.preferred_choice();
                if participant.role == Role::Majority && rng.gen_bool(0.1) {
                    choice = fd_core::Choice::Blue;
                }
                session.submit_choice(id, choice).unwrap()
            };
        }

        match progress {
            RoundProgress::Resolved { round } => info!("round {} resolved", round),
            RoundProgress::Aborted { round } => info!("round {} aborted: group failed", round),
            RoundProgress::Pending { awaiting } => {
                info!("round {} still waiting on {} players", number, awaiting)
            }
        }
    }

    info!(
        "session over: {} rounds played, failed = {}",
        session.rounds_played(),
        session.failed()
    );
    for &id in &members {
        if let Ok(payout) = session.payout(id) {
            let p = session.participant(id).unwrap();
            info!(
                "participant {} [{}]: {:.0} points -> {:.2} EUR (bonus {:.2}){}",
                id,
                p.role.label(),
                payout.points,
                payout.euros,
                payout.bonus,
                if p.is_dropout { " [dropout]" } else { "" }
            );
        }
    }

    info!("let seed = {:?};", seed);
}
