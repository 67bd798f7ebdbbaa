//! Batch extraction of significant memories via the cheap model.
//!
//! Runs on a spawned task, never on the turn path. The batch is a
//! snapshot of the newest ring entries; the ring itself is untouched, so
//! a concurrent turn and an extraction never contend on anything but the
//! store mutex for brief copies.

use chrono::Utc;

use tw_domain::trace::TraceEvent;
use tw_domain::wire::ExtractionOutput;
use tw_providers::RequestOptions;

use crate::compaction;
use crate::store::MemoryStore;
use crate::types::{Interaction, SignificantMemory};

const EXTRACTION_TEMPERATURE: f32 = 0.3;

/// Run one extraction pass: distill the newest interactions, absorb the
/// results, and compact when the significant set is over cap.
///
/// Errors are logged and swallowed; the store returns to idle and the
/// pending interactions stay in the ring for the next trigger.
pub(crate) async fn run(store: &MemoryStore) {
    let batch = store.extraction_batch();
    if batch.is_empty() {
        return;
    }

    let prompt = build_prompt(&batch);
    let opts = RequestOptions {
        use_cost_model: true,
        temperature: Some(EXTRACTION_TEMPERATURE),
        ..RequestOptions::default()
    };

    let output = match store
        .gateway()
        .structured_request::<ExtractionOutput>(&prompt, &opts)
        .await
    {
        Ok(structured) => structured.data,
        Err(e) => {
            tracing::warn!(error = %e, "memory extraction failed, will retry on next trigger");
            return;
        }
    };

    let now = Utc::now();
    let extracted: Vec<SignificantMemory> = output
        .memories
        .into_iter()
        .filter(|m| !m.summary.trim().is_empty())
        .map(|m| SignificantMemory::from_extracted(m, now))
        .collect();

    TraceEvent::MemoryExtraction {
        batch: batch.len(),
        extracted: extracted.len(),
    }
    .emit();

    // Empty output is legal and common: not every stretch of play is
    // worth remembering.
    if !extracted.is_empty() {
        store.absorb_extracted(extracted);
    }

    if store.over_significant_cap() {
        compaction::run(store).await;
    }
}

/// The extraction prompt: rules first, then the transcript batch, then
/// the output contract.
fn build_prompt(batch: &[Interaction]) -> String {
    let mut prompt = String::from(
        "You distill interactive-fiction play transcripts into long-lived memories.\n\
         Extract only moments that will matter later: bonds formed with characters, \
         discoveries, revelations, promises made, and goals adopted.\n\
         Rules:\n\
         - Only include what explicitly happened in the transcript.\n\
         - Prefer few strong memories over many weak ones. Zero is a valid answer.\n\
         - contextTriggers are short literal phrases likely to recur in player input.\n\n\
         Transcript:\n",
    );

    for interaction in batch {
        prompt.push_str(&format!(
            "Player: {}\nStory: {}\n\n",
            interaction.player_input, interaction.director_response
        ));
    }

    prompt.push_str(
        "Respond with JSON only, in exactly this shape:\n\
         {\"memories\": [{\"kind\": \"character_bond|discovery|revelation|promise|goal\", \
         \"summary\": \"...\", \"importance\": 1-10, \"participants\": [], \
         \"relatedItems\": [], \"relatedLocations\": [], \"contextTriggers\": []}]}\n",
    );

    prompt
}
