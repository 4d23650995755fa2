// Prompt templates for résumé analysis.
// One template per (depth, domain) pair. Syntax understood by the hydrator:
//   {{NAME}}                      placeholder, replaced by its value (or removed)
//   {{#if NAME}} ... {{/if}}      kept only when NAME has a non-empty value

use crate::analysis::models::{Depth, Domain};

pub struct PromptTemplate {
    pub depth: Depth,
    pub domain: Domain,
    pub system: &'static str,
    pub user: &'static str,
}

macro_rules! reviewer_rules {
    () => {
        "\n\nGROUND RULES:\n\
         - Base every observation on the résumé text provided. Do NOT invent employers, dates, \
         titles, or achievements.\n\
         - Quote the résumé when pointing at a specific line.\n\
         - Be direct and specific. Prefer \"Replace X with Y\" over general advice.\n\
         - Respond in Markdown with the section headings requested, in that order.\n\
         - Calibrate expectations to a {{EXPERIENCE_LEVEL}}-level candidate."
    };
}

macro_rules! system_universal {
    () => {
        "You are a senior recruiter and career coach who has screened thousands of résumés across \
         every industry. You give candid, practical feedback that helps candidates land interviews."
    };
}

macro_rules! system_technical {
    () => {
        "You are a senior engineering hiring manager and technical recruiter. You know how \
         engineering résumés are screened by recruiters, applicant tracking systems, and \
         hiring committees, and you judge technical depth, scope, and measurable impact."
    };
}

macro_rules! system_non_technical {
    () => {
        "You are a senior recruiter specialising in business, operations, sales, marketing, and \
         creative roles. You judge how clearly a résumé communicates outcomes, ownership, and \
         stakeholder impact to non-technical hiring managers."
    };
}

macro_rules! compact_length {
    () => {
        "\n- Keep the whole review under 400 words."
    };
}

macro_rules! full_length {
    () => {
        "\n- Be thorough: a complete review is typically 900-1500 words."
    };
}

macro_rules! candidate_context {
    () => {
        "Review the résumé below for this application.\n\n\
         TARGET ROLE: {{TARGET_ROLE}}\n\
         TARGET COMPANY: {{TARGET_COMPANY}}\n\
         EXPERIENCE LEVEL: {{EXPERIENCE_LEVEL}}\n\
         {{#if GEOGRAPHIC_FOCUS}}GEOGRAPHIC FOCUS: {{GEOGRAPHIC_FOCUS}} (apply that market's \
         résumé conventions and expectations)\n{{/if}}\
         {{#if SPECIAL_FOCUS}}SPECIAL FOCUS: {{SPECIAL_FOCUS}} (give this extra weight throughout \
         the review)\n{{/if}}\
         {{#if MEMO}}\nNOTES FROM THE CANDIDATE:\n{{MEMO}}\n{{/if}}\n\n"
    };
}

macro_rules! lens_universal {
    () => {
        "Judge the résumé the way a recruiter at {{TARGET_COMPANY}} hiring for {{TARGET_ROLE}} \
         would on a first 30-second scan.\n\n"
    };
}

macro_rules! lens_technical {
    () => {
        "Judge technical credibility: stack relevance to {{TARGET_ROLE}}, system scale, \
         ownership versus team contribution, and quantified engineering outcomes (latency, \
         throughput, cost, reliability).\n\n"
    };
}

macro_rules! lens_non_technical {
    () => {
        "Judge business impact: revenue, growth, cost, customer and stakeholder outcomes, and \
         leadership scope relevant to {{TARGET_ROLE}}. Flag jargon a hiring manager at \
         {{TARGET_COMPANY}} would not recognise.\n\n"
    };
}

macro_rules! compact_sections {
    () => {
        "Respond with exactly these sections:\n\
         ## Verdict\nOne paragraph: how competitive is this résumé for the role today?\n\
         ## Top 3 Fixes\nThe three changes with the biggest payoff, most important first.\n\
         ## Rewrite Example\nRewrite one weak bullet from the résumé into a strong one.\n\n"
    };
}

macro_rules! full_sections {
    () => {
        "Respond with exactly these sections:\n\
         ## Overall Assessment\nA short verdict and a score out of 10 for fit with the role.\n\
         ## Strengths\nWhat already works, with quotes.\n\
         ## Gaps Against the Role\nMissing skills, experience, or evidence the role expects.\n\
         ## Bullet-by-Bullet Improvements\nFor each weak bullet: the original, what is wrong, \
         and a rewritten version.\n\
         ## Keywords and ATS\nImportant keywords for {{TARGET_ROLE}} that are missing or buried.\n\
         ## Structure and Formatting\nOrder of sections, length, readability.\n\
         ## Action Plan\nA prioritised checklist of edits.\n\n"
    };
}

macro_rules! resume_block {
    () => {
        "RÉSUMÉ:\n\"\"\"\n{{RESUME_TEXT}}\n\"\"\""
    };
}

pub static TEMPLATES: [PromptTemplate; 6] = [
    PromptTemplate {
        depth: Depth::Compact,
        domain: Domain::Universal,
        system: concat!(system_universal!(), reviewer_rules!(), compact_length!()),
        user: concat!(
            candidate_context!(),
            lens_universal!(),
            compact_sections!(),
            resume_block!()
        ),
    },
    PromptTemplate {
        depth: Depth::Compact,
        domain: Domain::Technical,
        system: concat!(system_technical!(), reviewer_rules!(), compact_length!()),
        user: concat!(
            candidate_context!(),
            lens_technical!(),
            compact_sections!(),
            resume_block!()
        ),
    },
    PromptTemplate {
        depth: Depth::Compact,
        domain: Domain::NonTechnical,
        system: concat!(system_non_technical!(), reviewer_rules!(), compact_length!()),
        user: concat!(
            candidate_context!(),
            lens_non_technical!(),
            compact_sections!(),
            resume_block!()
        ),
    },
    PromptTemplate {
        depth: Depth::Full,
        domain: Domain::Universal,
        system: concat!(system_universal!(), reviewer_rules!(), full_length!()),
        user: concat!(
            candidate_context!(),
            lens_universal!(),
            full_sections!(),
            resume_block!()
        ),
    },
    PromptTemplate {
        depth: Depth::Full,
        domain: Domain::Technical,
        system: concat!(system_technical!(), reviewer_rules!(), full_length!()),
        user: concat!(
            candidate_context!(),
            lens_technical!(),
            full_sections!(),
            resume_block!()
        ),
    },
    PromptTemplate {
        depth: Depth::Full,
        domain: Domain::NonTechnical,
        system: concat!(system_non_technical!(), reviewer_rules!(), full_length!()),
        user: concat!(
            candidate_context!(),
            lens_non_technical!(),
            full_sections!(),
            resume_block!()
        ),
    },
];

pub fn find_template(depth: Depth, domain: Domain) -> Option<&'static PromptTemplate> {
    TEMPLATES
        .iter()
        .find(|t| t.depth == depth && t.domain == domain)
}

/// Appended to the content when the model stopped at its output limit.
pub const TRUNCATION_NOTICE: &str = "\n\n---\n*Note: this analysis reached the maximum response \
    length and may be incomplete. Try the compact depth for a shorter review.*";
