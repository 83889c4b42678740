//! Prompts for the LLM-assisted compiler.

use bibquery_plan::{FilterField, FilterOp, QueryPlan, SubjectHint};

use super::providers::clip_text;

pub fn system_prompt() -> String {
    let fields = FilterField::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let ops = FilterOp::ALL
        .iter()
        .map(|o| o.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You translate questions about a rare-book catalogue into a JSON query plan.

Return ONLY a JSON object: {{"filters": [...], "explanation": <one sentence or null>, "error": null}}.
If the question cannot be expressed as filters, return {{"filters": [], "explanation": null, "error": "<short reason>"}}.

Fields: {fields}
Operators: {ops}

Rules:
- Every filter must hold (filters are AND-ed). Use `negate: true` for "not"/"except".
- `year` only supports `range` with integer `start` and `end` (inclusive). "in 1550" is start=end=1550.
  The Nth century is start=(N-1)*100+1, end=N*100 (16th century = 1501..1600).
- `equals` and `contains` take a string `value`; `in` takes an array of strings.
- Publisher, place and agent_norm values are match keys: lower-case, no brackets, no punctuation
  except hyphens, single spaces. "[Venetiis]" becomes "venetiis".
- `language` values are MARC language codes (lat, heb, eng, fre, ger, ita, spa, gre, ara, yid).
- Use `contains` for topical words on `subject` and `title`; `equals` only for exact headings.
- Set `confidence` between 0 and 1 for each filter; explain uncertain choices in `notes`.

Disambiguation:
- "printed in Venice" / "from Amsterdam" is a city: field `place`.
  "printed in Italy" / "German imprints" is a country: field `country`.
- "published by Aldus" is the imprint publisher: field `publisher`.
  "printed by Bomberg" names the printer as an agent: field `agent_norm` equals "bomberg"
  AND field `agent_role` equals "printer".

Examples:
Q: books published by Elzevir between 1600 and 1650
{{"filters": [{{"field": "publisher", "op": "equals", "value": "elzevir", "start": null, "end": null, "negate": false, "confidence": 0.9, "notes": null}},
              {{"field": "year", "op": "range", "value": null, "start": 1600, "end": 1650, "negate": false, "confidence": 0.95, "notes": null}}]}}
Q: Hebrew books printed by Bomberg
{{"filters": [{{"field": "language", "op": "equals", "value": "heb", "start": null, "end": null, "negate": false, "confidence": 0.9, "notes": null}},
              {{"field": "agent_norm", "op": "equals", "value": "bomberg", "start": null, "end": null, "negate": false, "confidence": 0.85, "notes": null}},
              {{"field": "agent_role", "op": "equals", "value": "printer", "start": null, "end": null, "negate": false, "confidence": 0.85, "notes": null}}]}}
"#
    )
}

pub fn user_prompt(query_text: &str) -> String {
    format!("Question: {query_text}")
}

/// Prompt for the subject-hint retry: the previous plan found nothing, so
/// remap its subject term onto a heading that exists in the index.
pub fn render_subject_retry_prompt(plan: &QueryPlan, hints: &[SubjectHint]) -> String {
    let previous = serde_json::to_string(&plan.filters).unwrap_or_default();
    let mut out = format!(
        "Question: {}\n\n---\nYour previous plan returned no records:\n{previous}\n\n",
        plan.query_text
    );
    out.push_str(
        "The catalogue's most frequent subject headings are listed below with their record counts.\n\
         Replace the subject filter with a `contains` filter on the closest heading from this list \
         (use a distinctive word of the heading as the value). Keep all other filters unchanged.\n\n",
    );
    for hint in hints {
        out.push_str(&format!("- {} ({})\n", hint.value, hint.count));
    }
    out
}

/// Second chance after an answer that held no parseable plan object. Repeats
/// the question, restates the plan shape and quotes what went wrong.
pub fn render_json_repair_prompt(user_prompt: &str, invalid_response: &str, parse_error: &str) -> String {
    let excerpt = clip_text(invalid_response, 1_500);
    format!(
        "{user_prompt}\n\n\
         ---\n\
         Your last answer could not be parsed as a query plan ({parse_error}).\n\
         Answer again with a single JSON object and nothing around it:\n\
         {{\"filters\": [{{\"field\", \"op\", \"value\", \"start\", \"end\", \"negate\", \"confidence\", \"notes\"}}, ...], \
         \"explanation\": string or null, \"error\": string or null}}\n\n\
         Your last answer began:\n{excerpt}\n"
    )
}
