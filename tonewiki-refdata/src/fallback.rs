//! Built-in fallback tables
//!
//! Served when wiki integration is disabled or no source yields data. No
//! entry here carries a `source_url`; its absence is how callers and the
//! attribution layer recognise fallback data.

use crate::models::{CatalogEntry, Genre, MetaTag, Technique};

/// Entry types with a built-in table
pub trait FallbackEntry: CatalogEntry {
    fn fallback_entries() -> Vec<Self>;
}

impl FallbackEntry for Genre {
    fn fallback_entries() -> Vec<Self> {
        FallbackTables.genres()
    }
}

impl FallbackEntry for MetaTag {
    fn fallback_entries() -> Vec<Self> {
        FallbackTables.meta_tags()
    }
}

impl FallbackEntry for Technique {
    fn fallback_entries() -> Vec<Self> {
        FallbackTables.techniques()
    }
}

/// Fixed reference data bundled with the crate
///
/// Tables are small and rebuilt on demand, so callers always get owned
/// values they may filter or rank freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackTables;

impl FallbackTables {
    /// 12 primary genres with subgenres and characteristics
    pub fn genres(&self) -> Vec<Genre> {
        vec![
            Self::build_genre(
                "Rock",
                "Guitar-driven popular music with a strong backbeat.",
                &["Hard Rock", "Punk", "Grunge", "Indie Rock"],
                &["energetic", "guitar-driven", "rebellious", "loud"],
                &["electric guitar", "bass guitar", "drums"],
                &["defiant", "energetic"],
            ),
            Self::build_genre(
                "Pop",
                "Melodic, hook-based music aimed at a broad audience.",
                &["Synth-pop", "Dream Pop", "Indie Pop"],
                &["catchy", "upbeat", "polished", "melodic"],
                &["vocals", "synthesizer", "drum machine"],
                &["happy", "romantic"],
            ),
            Self::build_genre(
                "Folk",
                "Acoustic music rooted in traditional songs and storytelling.",
                &["Indie Folk", "Ambient Folk", "Folk Rock"],
                &["acoustic", "storytelling", "intimate", "organic"],
                &["acoustic guitar", "banjo", "fiddle"],
                &["nostalgic", "introspective"],
            ),
            Self::build_genre(
                "Jazz",
                "Improvisational music built on swing, blue notes and extended harmony.",
                &["Bebop", "Cool Jazz", "Smooth Jazz"],
                &["improvisational", "swing", "complex", "sophisticated"],
                &["saxophone", "piano", "double bass", "trumpet"],
                &["relaxed", "sophisticated"],
            ),
            Self::build_genre(
                "Blues",
                "Soulful music built on blue notes and the twelve-bar form.",
                &["Delta Blues", "Chicago Blues"],
                &["soulful", "melancholic", "raw", "expressive"],
                &["guitar", "harmonica", "piano"],
                &["sad", "longing"],
            ),
            Self::build_genre(
                "Electronic",
                "Music produced primarily with synthesizers and computers.",
                &["House", "Techno", "Ambient", "Drum and Bass"],
                &["synthetic", "rhythmic", "danceable", "atmospheric"],
                &["synthesizer", "drum machine", "sampler"],
                &["euphoric", "hypnotic"],
            ),
            Self::build_genre(
                "Hip Hop",
                "Rhythmic vocal delivery over beats and samples.",
                &["Trap", "Boom Bap", "Lo-fi Hip Hop"],
                &["rhythmic", "urban", "beat-driven", "confident"],
                &["turntables", "drum machine", "sampler"],
                &["confident", "gritty"],
            ),
            Self::build_genre(
                "Classical",
                "Orchestral and chamber music in the Western art tradition.",
                &["Baroque", "Romantic", "Minimalism"],
                &["orchestral", "complex", "dynamic", "elegant"],
                &["strings", "piano", "woodwinds", "brass"],
                &["majestic", "serene"],
            ),
            Self::build_genre(
                "Country",
                "Storytelling music from rural American traditions.",
                &["Bluegrass", "Americana", "Country Pop"],
                &["storytelling", "twangy", "heartfelt", "acoustic"],
                &["acoustic guitar", "pedal steel", "fiddle"],
                &["nostalgic", "heartfelt"],
            ),
            Self::build_genre(
                "R&B",
                "Smooth, groove-based vocal music rooted in soul.",
                &["Neo Soul", "Contemporary R&B"],
                &["smooth", "soulful", "groovy", "sensual"],
                &["vocals", "keyboards", "bass guitar"],
                &["romantic", "sensual"],
            ),
            Self::build_genre(
                "Metal",
                "Heavy, distorted and aggressive guitar music.",
                &["Heavy Metal", "Doom Metal", "Black Metal"],
                &["heavy", "aggressive", "distorted", "intense"],
                &["distorted guitar", "double bass drums", "bass guitar"],
                &["angry", "dark"],
            ),
            Self::build_genre(
                "Ambient",
                "Atmospheric music that favours texture over rhythm.",
                &["Dark Ambient", "Drone"],
                &["atmospheric", "calm", "spacious", "textural"],
                &["synthesizer", "field recordings", "piano"],
                &["peaceful", "introspective"],
            ),
        ]
    }

    /// 15 structural, vocal and instrumental tags
    pub fn meta_tags(&self) -> Vec<MetaTag> {
        vec![
            Self::build_tag("[Intro]", "structure", "Opening section that sets the mood", &["[Intro] soft piano"]),
            Self::build_tag("[Verse]", "structure", "Main narrative section", &["[Verse 1]", "[Verse 2]"]),
            Self::build_tag("[Pre-Chorus]", "structure", "Build-up leading into the chorus", &["[Pre-Chorus] rising tension"]),
            Self::build_tag("[Chorus]", "structure", "Repeated hook and emotional peak", &["[Chorus] full band"]),
            Self::build_tag("[Bridge]", "structure", "Contrasting section before the final chorus", &["[Bridge] stripped down"]),
            Self::build_tag("[Outro]", "structure", "Closing section", &["[Outro] fade out"]),
            Self::build_tag("[Instrumental]", "structure", "Section without vocals", &["[Instrumental] guitar solo"]),
            Self::build_tag("[Breakdown]", "structure", "Sparse section that drops most instruments", &["[Breakdown] drums only"]),
            Self::build_tag("[Whispered]", "vocal", "Soft, breathy vocal delivery", &["[Whispered] intimate verse"]),
            Self::build_tag("[Harmonies]", "vocal", "Layered vocal harmonies", &["[Harmonies] chorus"]),
            Self::build_tag("[Spoken Word]", "vocal", "Spoken rather than sung vocals", &["[Spoken Word] intro"]),
            Self::build_tag("[Guitar Solo]", "instrumental", "Lead guitar feature", &["[Guitar Solo] bluesy"]),
            Self::build_tag("[Piano Solo]", "instrumental", "Piano feature", &["[Piano Solo] melancholic"]),
            Self::build_tag("[Melancholic]", "mood", "Sad, reflective atmosphere", &["[Melancholic] slow ballad"]),
            Self::build_tag("[Upbeat]", "mood", "Bright, energetic atmosphere", &["[Upbeat] summer anthem"]),
        ]
    }

    /// 10 production and performance techniques
    pub fn techniques(&self) -> Vec<Technique> {
        vec![
            Self::build_technique("Double Tracking", "vocal", "Recording the same vocal twice for a thicker sound", &["thickening vocals", "choruses"], &["layered lead vocal"]),
            Self::build_technique("Call and Response", "arrangement", "Alternating phrases between voices or instruments", &["gospel", "blues", "live energy"], &["lead and backing vocals trading lines"]),
            Self::build_technique("Fingerpicking", "guitar", "Plucking strings individually with the fingers", &["folk", "intimate songs"], &["travis picking pattern"]),
            Self::build_technique("Palm Muting", "guitar", "Damping strings with the picking hand for a chugging tone", &["rock", "metal", "tension"], &["muted power chords"]),
            Self::build_technique("Sidechain Compression", "production", "Ducking one sound whenever another plays", &["dance music", "pumping effect"], &["pads ducking under the kick"]),
            Self::build_technique("Reverb Wash", "production", "Heavy reverb to create space and atmosphere", &["ambient", "dream pop", "atmosphere"], &["cavernous guitar reverb"]),
            Self::build_technique("Key Change", "arrangement", "Modulating up for a final lift", &["final chorus", "climax"], &["half-step lift before last chorus"]),
            Self::build_technique("Falsetto", "vocal", "Light head voice above the normal range", &["soul", "emotional peaks"], &["falsetto hook"]),
            Self::build_technique("Syncopation", "rhythm", "Accenting off-beats against the pulse", &["funk", "groove"], &["off-beat guitar stabs"]),
            Self::build_technique("Build and Drop", "arrangement", "Rising tension released into a full section", &["electronic", "dance music", "climax"], &["snare roll into drop"]),
        ]
    }

    fn build_genre(
        name: &str,
        description: &str,
        subgenres: &[&str],
        characteristics: &[&str],
        instruments: &[&str],
        moods: &[&str],
    ) -> Genre {
        let mut genre = Genre::new(name);
        genre.description = description.to_string();
        genre.subgenres = subgenres.iter().map(|s| s.to_string()).collect();
        genre.characteristics = characteristics.iter().map(|s| s.to_string()).collect();
        genre.typical_instruments = instruments.iter().map(|s| s.to_string()).collect();
        genre.mood_associations = moods.iter().map(|s| s.to_string()).collect();
        genre
    }

    fn build_tag(tag: &str, category: &str, description: &str, examples: &[&str]) -> MetaTag {
        let mut meta_tag = MetaTag::new(tag, category);
        meta_tag.description = description.to_string();
        meta_tag.usage_examples = examples.iter().map(|s| s.to_string()).collect();
        meta_tag
    }

    fn build_technique(
        name: &str,
        technique_type: &str,
        description: &str,
        scenarios: &[&str],
        examples: &[&str],
    ) -> Technique {
        let mut technique = Technique::new(name, technique_type);
        technique.description = description.to_string();
        technique.applicable_scenarios = scenarios.iter().map(|s| s.to_string()).collect();
        technique.examples = examples.iter().map(|s| s.to_string()).collect();
        technique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::normalize_name;
    use std::collections::HashSet;

    fn assert_unlabeled_and_unique<T: CatalogEntry>(entries: &[T]) {
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|e| e.source_url().is_none()));
        let names: HashSet<String> = entries.iter().map(|e| normalize_name(e.match_name())).collect();
        assert_eq!(names.len(), entries.len());
    }

    #[test]
    fn test_tables_have_no_source_and_unique_names() {
        let tables = FallbackTables;
        assert_unlabeled_and_unique(&tables.genres());
        assert_unlabeled_and_unique(&tables.meta_tags());
        assert_unlabeled_and_unique(&tables.techniques());
    }

    #[test]
    fn test_table_sizes() {
        let tables = FallbackTables;
        assert_eq!(tables.genres().len(), 12);
        assert_eq!(tables.meta_tags().len(), 15);
        assert_eq!(tables.techniques().len(), 10);
    }

    #[test]
    fn test_meta_tags_use_bracket_form() {
        assert!(FallbackTables
            .meta_tags()
            .iter()
            .all(|t| t.tag.starts_with('[') && t.tag.ends_with(']')));
    }
}
