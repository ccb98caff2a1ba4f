//! Guided meditation script generation.
//!
//! Scripts are assembled from per-kind phrase pools: one intro, a number of
//! body segments scaled to the requested length, and one closing. The random
//! source is injected so a seeded generator always yields the same script.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minutes of meditation covered by one body segment.
const MINUTES_PER_SEGMENT: u32 = 2;
const MIN_SEGMENTS: usize = 2;
const MAX_SEGMENTS: usize = 12;
pub const MAX_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeditationKind {
    Breathing,
    BodyScan,
    LovingKindness,
    Sleep,
    AnxietyRelief,
}

impl MeditationKind {
    pub const ALL: [MeditationKind; 5] = [
        MeditationKind::Breathing,
        MeditationKind::BodyScan,
        MeditationKind::LovingKindness,
        MeditationKind::Sleep,
        MeditationKind::AnxietyRelief,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeditationKind::Breathing => "breathing",
            MeditationKind::BodyScan => "body_scan",
            MeditationKind::LovingKindness => "loving_kindness",
            MeditationKind::Sleep => "sleep",
            MeditationKind::AnxietyRelief => "anxiety_relief",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MeditationKind::Breathing => "Mindful Breathing",
            MeditationKind::BodyScan => "Body Scan",
            MeditationKind::LovingKindness => "Loving Kindness",
            MeditationKind::Sleep => "Drifting Into Sleep",
            MeditationKind::AnxietyRelief => "Calming Anxiety",
        }
    }

    fn body_pool(&self) -> &'static [&'static str] {
        match self {
            MeditationKind::Breathing => &[
                "Breathe in slowly through your nose for a count of four.",
                "Hold the breath gently at the top, without strain.",
                "Let the breath leave through your mouth, slow and complete.",
                "Notice the cool air as it enters and the warm air as it leaves.",
                "If your mind wanders, simply return to the next breath.",
                "Feel your belly rise and fall with each breath.",
            ],
            MeditationKind::BodyScan => &[
                "Bring your attention to the soles of your feet.",
                "Notice any tension in your calves and let it soften.",
                "Move your awareness up through your knees and thighs.",
                "Feel the weight of your hips resting where you sit or lie.",
                "Let your shoulders drop away from your ears.",
                "Relax the small muscles around your eyes and jaw.",
                "Sense your whole body at once, breathing and at rest.",
            ],
            MeditationKind::LovingKindness => &[
                "Silently repeat: may I be safe, may I be well.",
                "Picture someone you love and offer them the same wish.",
                "Bring to mind a neutral acquaintance and wish them ease.",
                "Extend kindness to someone you find difficult.",
                "Let the wish spread outward to everyone, everywhere.",
            ],
            MeditationKind::Sleep => &[
                "Let your body grow heavy, sinking into the bed.",
                "With each breath out, release a little more of the day.",
                "Imagine a soft, warm light slowly dimming.",
                "There is nothing you need to do right now.",
                "Allow your thoughts to drift past like slow clouds.",
                "Let your breathing become slow and natural.",
            ],
            MeditationKind::AnxietyRelief => &[
                "Name five things you can see around you.",
                "Place a hand on your chest and feel it rise and fall.",
                "Remind yourself: this feeling is temporary, and it will pass.",
                "Breathe in for four, hold for four, out for six.",
                "Press your feet into the floor and feel the ground supporting you.",
                "Notice where the anxiety lives in your body, and breathe into that place.",
            ],
        }
    }
}

impl std::fmt::Display for MeditationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MeditationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "breathing" => Ok(MeditationKind::Breathing),
            "body_scan" => Ok(MeditationKind::BodyScan),
            "loving_kindness" => Ok(MeditationKind::LovingKindness),
            "sleep" => Ok(MeditationKind::Sleep),
            "anxiety_relief" | "anxiety" => Ok(MeditationKind::AnxietyRelief),
            _ => Err(ValidationError::new(
                "kind",
                format!("Unknown meditation kind: {}", s),
            )),
        }
    }
}

const INTROS: &[&str] = &[
    "Find a comfortable position and gently close your eyes.",
    "Welcome. Take a moment to settle in and let the world slow down.",
    "Let's begin by arriving here, in this moment, just as you are.",
];

const CLOSINGS: &[&str] = &[
    "When you're ready, slowly open your eyes and return to the room.",
    "Carry this sense of calm with you into the rest of your day.",
    "Take one more deep breath, and thank yourself for this time.",
];

/// A generated meditation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeditationScript {
    pub kind: MeditationKind,
    pub title: String,
    pub minutes: u32,
    pub segments: Vec<String>,
}

impl MeditationScript {
    /// The whole script as narration text
    pub fn text(&self) -> String {
        self.segments.join("\n\n")
    }
}

/// Builds meditation scripts from a random source.
pub struct ScriptGenerator<G: Rng> {
    rng: G,
}

impl ScriptGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<G: Rng> ScriptGenerator<G> {
    pub fn new(rng: G) -> Self {
        Self { rng }
    }

    /// Number of body segments for a duration
    pub fn segment_count(minutes: u32) -> usize {
        ((minutes / MINUTES_PER_SEGMENT) as usize).clamp(MIN_SEGMENTS, MAX_SEGMENTS)
    }

    pub fn generate(
        &mut self,
        kind: MeditationKind,
        minutes: u32,
    ) -> Result<MeditationScript, ValidationError> {
        if minutes == 0 || minutes > MAX_MINUTES {
            return Err(ValidationError::new(
                "minutes",
                format!("Duration must be between 1 and {} minutes", MAX_MINUTES),
            ));
        }

        let count = Self::segment_count(minutes);
        let pool = kind.body_pool();

        let mut segments = Vec::with_capacity(count + 2);
        segments.push(self.pick(INTROS));

        // Shuffle the pool and walk it, reshuffling when exhausted, so a
        // phrase only repeats once every other phrase has been used.
        let mut order: Vec<&str> = Vec::new();
        while segments.len() < count + 1 {
            if order.is_empty() {
                order = pool.to_vec();
                order.shuffle(&mut self.rng);
            }
            if let Some(phrase) = order.pop() {
                segments.push(phrase.to_string());
            }
        }

        segments.push(self.pick(CLOSINGS));

        Ok(MeditationScript {
            kind,
            title: kind.title().to_string(),
            minutes,
            segments,
        })
    }

    fn pick(&mut self, pool: &[&str]) -> String {
        pool.choose(&mut self.rng)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}
