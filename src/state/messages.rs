//! User-facing outcome and error texts shown in the `Message` state.

use rand::{Rng, seq::IndexedRandom};

use crate::state::coin::{CoinSide, Outcome};

/// Shown when the result source does not answer within the request timeout.
pub const TIMEOUT_MESSAGE: &str = "Could not get a result (timeout). Try again.";
/// Shown when the result source reports a failure.
pub const FAILURE_MESSAGE: &str = "Could not get a result. Please try again.";

const WIN_TEMPLATES: &[&str] = &[
    "Called it: {result}!",
    "Sharp eyes. {result} it is.",
    "{result} lands. Great guess.",
    "Clean pick, the coin agrees: {result}.",
    "You read that one perfectly: {result}.",
];

const LOSE_TEMPLATES: &[&str] = &[
    "{result} this time. Run it back?",
    "So close, {result} had other plans.",
    "You picked {choice}, the coin said {result}.",
    "Not your toss: {result}. Again?",
    "{result} lands. Revenge toss?",
];

/// Pick a random celebration or consolation line for a settled round.
pub fn pick_message<R: Rng + ?Sized>(choice: CoinSide, result: CoinSide, rng: &mut R) -> String {
    let templates = match Outcome::of(choice, result) {
        Outcome::Win => WIN_TEMPLATES,
        Outcome::Lose => LOSE_TEMPLATES,
    };

    let template = templates.choose(rng).copied().unwrap_or("{result}.");
    template
        .replace("{result}", result.label())
        .replace("{choice}", choice.label())
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn every_template_names_the_result() {
        for template in WIN_TEMPLATES.iter().chain(LOSE_TEMPLATES) {
            assert!(template.contains("{result}"), "template `{template}`");
        }
    }

    #[test]
    fn messages_mention_the_landed_side() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let win = pick_message(CoinSide::Tails, CoinSide::Tails, &mut rng);
            assert!(win.contains("Tails"));
            assert!(!win.contains('{'));

            let lose = pick_message(CoinSide::Heads, CoinSide::Tails, &mut rng);
            assert!(lose.contains("Tails"));
            assert!(!lose.contains('{'));
        }
    }

    #[test]
    fn win_and_lose_use_distinct_pools() {
        let mut rng = StdRng::seed_from_u64(11);
        let win = pick_message(CoinSide::Heads, CoinSide::Heads, &mut rng);
        let rendered_losses: Vec<String> = LOSE_TEMPLATES
            .iter()
            .map(|t| t.replace("{result}", "Heads").replace("{choice}", "Heads"))
            .collect();
        assert!(!rendered_losses.contains(&win));
    }
}
