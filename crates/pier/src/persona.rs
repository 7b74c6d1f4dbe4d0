//! The characters the agent can play.

use rand::seq::SliceRandom;

/// Words that end a conversation, compared case-insensitively.
pub const EXIT_WORDS: [&str; 2] = ["quitter", "exit"];

const SUNNY_GOODBYES: [&str; 9] = [
    "Enfin libre. Ne reviens pas trop vite.",
    "*Soupir*... enfin un peu de calme.",
    "Allez, file. L'océan t'attend (et moi, je vais faire la sieste).",
    "Essaie de ne pas couler, ça ferait désordre dans mes statistiques.",
    "Allez, va te congeler les orteils, moi je reste au chaud.",
    "*Soupir*... de rien, c'était dur.",
    "Allez, file. L'horizon n'attend pas, et mon café non plus.",
    "Salut. Si tu vois la houle se lever, ne reviens pas me le dire, je dors.",
    "Allez, ouste. Et ne dis à personne que c'est moi qui t'ai donné les infos.",
];

const SUNNY_DREAM_GOODBYE: &str =
    "Tu es encore là à me dire au revoir ? Je t'ai dit que c'était parfait, BOUGE TES FESSES !";

const BACCHUS_GOODBYE: &str = "Bonne dégustation ! À bientôt !";

/// A tool a persona can be given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// `get_user_location`
    UserLocation,
    /// `get_weather_for_location`
    Weather,
    /// `get_surf_conditions`
    Surf,
    /// `search_surf_knowledge`, needs a knowledge base.
    Knowledge,
    /// `search_wine_web`
    WineWebSearch,
    /// `search_wine_recommendations`
    WineRecommendations,
    /// `search_wine_prices`
    WinePrices,
}

/// A character: its prompt, its tools and its model settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Persona {
    /// The grumpy weather and surf forecaster.
    Sunny,
    /// Sunny with the surf spots and gear knowledge base.
    SunnyKnowledge,
    /// The wine sommelier.
    Bacchus,
}

impl Persona {
    /// The name shown in front of its replies.
    pub fn display_name(self) -> &'static str {
        match self {
            Persona::Sunny | Persona::SunnyKnowledge => "Sunny",
            Persona::Bacchus => "Bacchus IA",
        }
    }

    /// The system prompt, in French.
    pub fn system_prompt(self) -> &'static str {
        match self {
            Persona::Sunny => include_str!("./prompts/sunny.md"),
            Persona::SunnyKnowledge => include_str!("./prompts/sunny_knowledge.md"),
            Persona::Bacchus => include_str!("./prompts/bacchus.md"),
        }
    }

    /// The tools registered on the agent, in registration order.
    pub fn tools(self) -> &'static [ToolKind] {
        match self {
            Persona::Sunny => &[ToolKind::UserLocation, ToolKind::Weather, ToolKind::Surf],
            Persona::SunnyKnowledge => &[ToolKind::Surf, ToolKind::Knowledge],
            Persona::Bacchus => &[
                ToolKind::WineWebSearch,
                ToolKind::WineRecommendations,
                ToolKind::WinePrices,
            ],
        }
    }

    /// Whether the persona needs a knowledge base to be built.
    #[inline]
    pub fn needs_knowledge_base(self) -> bool {
        self.tools().contains(&ToolKind::Knowledge)
    }

    /// The model used unless configured otherwise.
    pub fn default_model(self) -> &'static str {
        match self {
            Persona::Sunny => "llama-3.1-8b-instant",
            Persona::SunnyKnowledge | Persona::Bacchus => "llama-3.3-70b-versatile",
        }
    }

    /// Sampling temperature.
    pub fn temperature(self) -> f32 {
        match self {
            Persona::Sunny => 0.5,
            Persona::SunnyKnowledge => 0.1,
            Persona::Bacchus => 0.0,
        }
    }

    /// Completion token limit.
    #[inline]
    pub fn max_tokens(self) -> u32 {
        2048
    }

    /// The two lines printed when a conversation starts.
    pub fn banner(self) -> [&'static str; 2] {
        match self {
            Persona::Sunny | Persona::SunnyKnowledge => [
                "--- Sunny est en ligne (et il est déjà grognon) ---",
                "(Tape 'quitter' ou 'exit' pour le laisser tranquille)",
            ],
            Persona::Bacchus => [
                "--- Bacchus IA est en ligne ! ---",
                "(Tape 'quitter' ou 'exit' pour quitter la conversation)",
            ],
        }
    }

    /// The last words of the persona.
    ///
    /// Sunny has a special line once it has announced a dream session.
    pub fn farewell(self, dream_session_seen: bool) -> &'static str {
        match self {
            Persona::Sunny | Persona::SunnyKnowledge => {
                if dream_session_seen {
                    SUNNY_DREAM_GOODBYE
                } else {
                    SUNNY_GOODBYES
                        .choose(&mut rand::thread_rng())
                        .copied()
                        .unwrap_or(SUNNY_GOODBYES[0])
                }
            }
            Persona::Bacchus => BACCHUS_GOODBYE,
        }
    }
}

/// Returns `true` if `input` asks to end the conversation.
pub fn is_exit_word(input: &str) -> bool {
    let input = input.trim();
    EXIT_WORDS.iter().any(|word| input.eq_ignore_ascii_case(word))
}
