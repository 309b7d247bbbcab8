//! Confirmation prompt shown before promoting into Production.
//!
//! Uses dialoguer for the prompt; the summary goes to a writer so it can be
//! checked in tests.

use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use fabdeploy_core::types::Stage;

/// What is about to be promoted.
#[derive(Debug, Clone)]
pub struct PromotionPlan<'a> {
    pub pipeline: &'a str,
    pub source: &'a str,
    pub target: &'a str,
    pub note: &'a str,
}

impl PromotionPlan<'_> {
    /// Only promotions into Production ask before running.
    pub fn needs_confirmation(&self) -> bool {
        Stage::from_display_name(self.target) == Some(Stage::Production)
    }
}

/// Ask before a Production promotion. Returns `true` when the promotion
/// should go ahead.
pub fn confirm_promotion(plan: &PromotionPlan<'_>, yes: bool) -> Result<bool> {
    if yes || !plan.needs_confirmation() {
        return Ok(true);
    }
    let mut stdout = io::stdout();
    write_summary(&mut stdout, plan)?;
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Promote to {}?", plan.target))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

fn write_summary<W: Write>(writer: &mut W, plan: &PromotionPlan<'_>) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", style("Production promotion").bold().yellow())?;
    writeln!(writer, "  Pipeline: {}", style(plan.pipeline).cyan())?;
    writeln!(
        writer,
        "  Stages:   {} → {}",
        plan.source,
        style(plan.target).bold()
    )?;
    if !plan.note.is_empty() {
        writeln!(writer, "  Note:     {}", plan.note)?;
    }
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan<'a>(target: &'a str, note: &'a str) -> PromotionPlan<'a> {
        PromotionPlan {
            pipeline: "Sales",
            source: "Test",
            target,
            note,
        }
    }

    #[test]
    fn only_production_targets_need_confirmation() {
        assert!(plan("Production", "").needs_confirmation());
        assert!(plan("prod", "").needs_confirmation());
        assert!(!plan("Test", "").needs_confirmation());
    }

    #[test]
    fn non_production_promotion_skips_prompt() {
        assert!(confirm_promotion(&plan("Test", ""), false).unwrap());
    }

    #[test]
    fn yes_flag_skips_prompt() {
        assert!(confirm_promotion(&plan("Production", ""), true).unwrap());
    }

    #[test]
    fn summary_lists_stages_and_note() {
        console::set_colors_enabled(false);
        let mut out = Vec::new();
        write_summary(&mut out, &plan("Production", "release 42")).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Pipeline: Sales"));
        assert!(text.contains("Test → Production"));
        assert!(text.contains("Note:     release 42"));
    }
}
