//! Event-driven stem reconstruction.
//!
//! Each forensic category gets a silent copy of the original waveform. Every
//! event paints one clip of original audio into its category's copy. Vocals
//! and background are left alone when the separator already produced them.
//! Categories that stay silent are not emitted.

use crate::audio::{Waveform, WaveformStore};
use crate::debug_log::DebugLog;
use crate::defaults;
use crate::error::Result;
use crate::events::{ForensicCategory, SoundEvent, categorize};
use crate::stems::{OutputLayout, StemSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForensicMasker {
    clip_duration_secs: f64,
}

impl Default for ForensicMasker {
    fn default() -> Self {
        Self::new(defaults::CLIP_DURATION_SECS)
    }
}

impl ForensicMasker {
    pub fn new(clip_duration_secs: f64) -> Self {
        Self { clip_duration_secs }
    }

    /// Frame window `[start, end)` covered by an event at `time`, clamped to
    /// `[0, frames]`. `None` when the clamped window is empty.
    pub fn window(&self, time: f64, sample_rate: u32, frames: usize) -> Option<(usize, usize)> {
        let sr = sample_rate as f64;
        // `as usize` saturates: negatives and NaN become 0, huge values usize::MAX.
        let start = ((time * sr).floor() as usize).min(frames);
        let end = (((time + self.clip_duration_secs) * sr).floor() as usize).min(frames);
        (start < end).then_some((start, end))
    }

    /// Build one masked waveform per category from `events`.
    ///
    /// `existing` holds the separator's stems; vocals and background events
    /// are skipped when their stem is already there.
    ///
    /// # Errors
    /// Returns `InvalidAudio` only if a window falls outside the waveform,
    /// which the clamping in [`ForensicMasker::window`] rules out.
    pub fn mask(
        &self,
        original: &Waveform,
        events: &[SoundEvent],
        existing: &StemSet,
        log: &mut DebugLog,
    ) -> Result<MaskOutcome> {
        let frames = original.frame_count();
        let mut buffers: [Option<Waveform>; ForensicCategory::ALL.len()] = Default::default();

        log.push(format!("Found {} sound events.", events.len()));

        let mut matched = 0;
        let mut deferred = 0;
        let mut segments = 0;

        for event in events {
            let Some(category) = categorize(&event.label) else {
                continue;
            };
            matched += 1;

            if category.is_separable() && existing.contains(category.name()) {
                deferred += 1;
                continue;
            }

            let Some((start, end)) = self.window(event.time, original.sample_rate(), frames)
            else {
                tracing::trace!(time = event.time, label = %event.label, "event outside recording");
                continue;
            };

            buffers[category as usize]
                .get_or_insert_with(|| original.silent_like())
                .copy_frames_from(original, start, end)?;
            segments += 1;
        }

        log.push(format!(
            "Matched {} events to forensic categories, {} deferred to separator stems.",
            matched, deferred
        ));
        log.push(format!("Processed {} event segments matches.", segments));

        let mut stems = Vec::new();
        for category in ForensicCategory::ALL {
            let buffer = buffers[category as usize].take();
            let peak = buffer.as_ref().map_or(0.0, Waveform::peak);
            log.push(format!("Stem {} peak amplitude: {}", category, peak));
            if let Some(buffer) = buffer
                && peak > 0.0
            {
                stems.push((category, buffer));
            }
        }

        Ok(MaskOutcome {
            stems,
            events_found: events.len(),
            events_matched: matched,
            events_deferred: deferred,
            segments_written: segments,
        })
    }
}

/// Masked category waveforms that passed the peak check, plus counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOutcome {
    stems: Vec<(ForensicCategory, Waveform)>,
    pub events_found: usize,
    pub events_matched: usize,
    pub events_deferred: usize,
    pub segments_written: usize,
}

impl MaskOutcome {
    /// Emitted stems in category order.
    pub fn stems(&self) -> &[(ForensicCategory, Waveform)] {
        &self.stems
    }

    pub fn get(&self, category: ForensicCategory) -> Option<&Waveform> {
        self.stems
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, w)| w)
    }

    pub fn categories(&self) -> impl Iterator<Item = ForensicCategory> + '_ {
        self.stems.iter().map(|(c, _)| *c)
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Write every emitted stem under the job's generated directory.
    ///
    /// # Errors
    /// Returns `AudioWrite` if a file cannot be written. Stems written before
    /// the failure stay on disk.
    pub fn persist(
        &self,
        store: &WaveformStore,
        layout: &OutputLayout,
        log: &mut DebugLog,
    ) -> Result<StemSet> {
        let mut generated = StemSet::new();
        if self.stems.is_empty() {
            return Ok(generated);
        }

        let dir = layout.generated_dir();
        for (category, waveform) in &self.stems {
            let path = dir.join(format!("{}.wav", category.name()));
            store.write(&path, waveform)?;
            generated.insert_if_absent(category.name(), layout.generated_url(category.name()));
        }
        log.push(format!(
            "Generated {} masked stems in {}",
            generated.len(),
            dir.display()
        ));
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    /// 10 s ramp so every frame is distinct and non-zero.
    fn ten_second_mono() -> Waveform {
        let samples = (0..SR as usize * 10)
            .map(|i| 0.1 + (i % 1000) as f32 / 2000.0)
            .collect();
        Waveform::mono(SR, samples).unwrap()
    }

    fn ev(time: f64, label: &str) -> SoundEvent {
        SoundEvent::new(time, label)
    }

    fn mask(w: &Waveform, events: &[SoundEvent], existing: &StemSet) -> (MaskOutcome, DebugLog) {
        let mut log = DebugLog::new();
        let outcome = ForensicMasker::default()
            .mask(w, events, existing, &mut log)
            .unwrap();
        (outcome, log)
    }

    #[test]
    fn empty_events_emit_nothing() {
        let (outcome, log) = mask(&ten_second_mono(), &[], &StemSet::new());
        assert!(outcome.is_empty());
        assert_eq!(outcome.events_found, 0);
        assert!(log.contains("Found 0 sound events."));
        assert!(log.contains("Processed 0 event segments matches."));
    }

    #[test]
    fn single_voice_event_paints_one_clip() {
        let original = ten_second_mono();
        let (outcome, _) = mask(&original, &[ev(2.0, "Human Voice")], &StemSet::new());

        assert_eq!(
            outcome.categories().collect::<Vec<_>>(),
            [ForensicCategory::Vocals]
        );
        let vocals = outcome.get(ForensicCategory::Vocals).unwrap();
        let start = 88200;
        let end = (2.975 * SR as f64).floor() as usize;
        assert_eq!(vocals.frames(start, end), original.frames(start, end));
        assert!(vocals.frames(0, start).iter().all(|&s| s == 0.0));
        assert!(
            vocals
                .frames(end, vocals.frame_count())
                .iter()
                .all(|&s| s == 0.0)
        );
    }

    #[test]
    fn masking_is_deterministic() {
        let original = ten_second_mono();
        let events = [ev(0.5, "Dog"), ev(3.0, "Glass"), ev(3.2, "glass shatter")];
        let (a, _) = mask(&original, &events, &StemSet::new());
        let (b, _) = mask(&original, &events, &StemSet::new());
        assert_eq!(a, b);
    }

    #[test]
    fn separator_vocals_are_deferred_to() {
        let mut existing = StemSet::new();
        existing.insert_if_absent("vocals", "/separated_audio/htdemucs/j/vocals.wav");

        let (outcome, _) = mask(
            &ten_second_mono(),
            &[ev(2.0, "Speech"), ev(4.0, "Siren")],
            &existing,
        );

        assert!(outcome.get(ForensicCategory::Vocals).is_none());
        assert!(outcome.get(ForensicCategory::Sirens).is_some());
        assert_eq!(outcome.events_found, 2);
        assert_eq!(outcome.events_matched, 2);
        assert_eq!(outcome.events_deferred, 1);
        assert_eq!(outcome.segments_written, 1);
    }

    #[test]
    fn separator_background_is_deferred_to() {
        let mut existing = StemSet::new();
        existing.insert_if_absent("background", "/b.wav");
        let (outcome, _) = mask(&ten_second_mono(), &[ev(1.0, "Music")], &existing);
        assert!(outcome.is_empty());
        assert_eq!(outcome.segments_written, 0);
    }

    #[test]
    fn other_separator_stems_do_not_defer() {
        // A separator "drums" stem never suppresses masked categories.
        let mut existing = StemSet::new();
        existing.insert_if_absent("drums", "/d.wav");
        existing.insert_if_absent("sirens", "/s.wav");
        let (outcome, _) = mask(&ten_second_mono(), &[ev(1.0, "Siren")], &existing);
        assert!(outcome.get(ForensicCategory::Sirens).is_some());
    }

    #[test]
    fn event_past_the_end_is_dropped() {
        let (outcome, _) = mask(&ten_second_mono(), &[ev(10.5, "Gunshot")], &StemSet::new());
        assert!(outcome.is_empty());
        assert_eq!(outcome.events_matched, 1);
        assert_eq!(outcome.segments_written, 0);
    }

    #[test]
    fn event_overlapping_the_end_is_clamped() {
        let original = ten_second_mono();
        let (outcome, _) = mask(&original, &[ev(9.5, "Gunshot")], &StemSet::new());
        let gun = outcome.get(ForensicCategory::Gunshots).unwrap();
        let start = (9.5 * SR as f64) as usize;
        assert_eq!(
            gun.frames(start, original.frame_count()),
            original.frames(start, original.frame_count())
        );
    }

    #[test]
    fn negative_time_is_clamped_to_zero() {
        let original = ten_second_mono();
        let (outcome, _) = mask(&original, &[ev(-0.5, "Door")], &StemSet::new());
        let impact = outcome.get(ForensicCategory::Impact).unwrap();
        let end = (0.475 * SR as f64).floor() as usize;
        assert_eq!(impact.frames(0, end), original.frames(0, end));
        assert_eq!(impact.frames(end, end + 1), &[0.0]);
    }

    #[test]
    fn silent_source_window_is_not_emitted() {
        let mut samples = vec![0.0f32; SR as usize * 4];
        samples[SR as usize * 3] = 0.5;
        let original = Waveform::mono(SR, samples).unwrap();

        let (outcome, log) = mask(&original, &[ev(0.0, "Siren")], &StemSet::new());
        assert!(outcome.is_empty());
        assert_eq!(outcome.segments_written, 1);
        assert!(log.contains("Stem sirens peak amplitude: 0"));
    }

    #[test]
    fn unknown_labels_are_dropped_silently() {
        let (outcome, _) = mask(
            &ten_second_mono(),
            &[ev(1.0, "AMBIENT"), ev(2.0, "Silence")],
            &StemSet::new(),
        );
        assert!(outcome.is_empty());
        assert_eq!(outcome.events_found, 2);
        assert_eq!(outcome.events_matched, 0);
    }

    #[test]
    fn overlapping_events_leave_no_gap() {
        let original = ten_second_mono();
        let (outcome, _) = mask(
            &original,
            &[ev(1.0, "Siren"), ev(1.5, "Siren")],
            &StemSet::new(),
        );
        let sirens = outcome.get(ForensicCategory::Sirens).unwrap();
        let start = 44100;
        let end = (2.475 * SR as f64).floor() as usize;
        assert_eq!(sirens.frames(start, end), original.frames(start, end));
        assert!(sirens.frames(0, start).iter().all(|&s| s == 0.0));
        assert!(
            sirens
                .frames(end, sirens.frame_count())
                .iter()
                .all(|&s| s == 0.0)
        );
    }

    #[test]
    fn stereo_frames_are_copied_whole() {
        let samples: Vec<f32> = (0..8000 * 2)
            .map(|i| if i % 2 == 0 { 0.25 } else { -0.5 })
            .collect();
        let original = Waveform::new(8000, 2, samples).unwrap();
        let (outcome, _) = mask(&original, &[ev(0.5, "Dog")], &StemSet::new());

        let animals = outcome.get(ForensicCategory::Animals).unwrap();
        assert_eq!(animals.channels(), 2);
        assert_eq!(animals.frames(4000, 4001), &[0.25, -0.5]);
        assert_eq!(animals.frames(3999, 4000), &[0.0, 0.0]);
    }

    #[test]
    fn peak_is_logged_for_every_category() {
        let (_, log) = mask(&ten_second_mono(), &[ev(1.0, "Dog")], &StemSet::new());
        for category in ForensicCategory::ALL {
            assert!(log.contains(&format!("Stem {} peak amplitude:", category)));
        }
    }

    #[test]
    fn window_bounds() {
        let masker = ForensicMasker::new(1.0);
        assert_eq!(masker.window(0.0, 10, 100), Some((0, 10)));
        assert_eq!(masker.window(9.5, 10, 100), Some((95, 100)));
        assert_eq!(masker.window(10.0, 10, 100), None);
        assert_eq!(masker.window(-2.0, 10, 100), None);
        assert_eq!(masker.window(f64::NAN, 10, 100), None);
    }

    #[test]
    fn persist_writes_job_scoped_files() {
        let dir = tempfile::tempdir().unwrap();
        let original = ten_second_mono();
        let (outcome, mut log) = mask(
            &original,
            &[ev(1.0, "Siren"), ev(5.0, "Dog")],
            &StemSet::new(),
        );

        let layout = OutputLayout::new(dir.path(), "/separated_audio", "job-1");
        let store = WaveformStore::default();
        let stems = outcome.persist(&store, &layout, &mut log).unwrap();

        assert_eq!(stems.names().collect::<Vec<_>>(), ["animals", "sirens"]);
        assert_eq!(
            stems.get("sirens"),
            Some("/separated_audio/generated/job-1/sirens.wav")
        );
        let written = store
            .load(&dir.path().join("generated/job-1/sirens.wav"))
            .unwrap();
        assert_eq!(&written, outcome.get(ForensicCategory::Sirens).unwrap());
    }

    #[test]
    fn persist_of_empty_outcome_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, mut log) = mask(&ten_second_mono(), &[], &StemSet::new());
        let layout = OutputLayout::new(dir.path(), "/separated_audio", "job-1");
        let stems = outcome
            .persist(&WaveformStore::default(), &layout, &mut log)
            .unwrap();
        assert!(stems.is_empty());
        assert!(!dir.path().join("generated").exists());
    }
}
