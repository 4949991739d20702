//! Table and JSON rendering for command results.

use console::style;
use serde::Serialize;

use coursefetch::{ExternalCourse, ExternalEnrollment, ExternalMaterial};

#[derive(Debug, Serialize)]
pub struct ProviderRow {
    pub name: String,
    pub kind: String,
    pub configured: bool,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cut to `width` characters, marking the cut with `…`.
fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn print_providers(rows: &[ProviderRow], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(rows);
    }
    if rows.is_empty() {
        println!("{} No providers configured", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Providers").bold());
    println!("{}", "-".repeat(50));
    println!("{:<20} {:<10} Status", "Name", "Kind");
    println!("{}", "-".repeat(50));
    for row in rows {
        let status = if row.configured {
            style("configured").green()
        } else {
            style("missing credentials").red()
        };
        println!("{:<20} {:<10} {}", clip(&row.name, 20), row.kind, status);
    }
    Ok(())
}

pub fn print_courses(courses: &[ExternalCourse], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(courses);
    }
    println!("\n{} ({})", style("Courses").bold(), courses.len());
    println!("{}", "-".repeat(80));
    for course in courses {
        println!("{}", style(&course.title).bold());
        println!("  id:   {}", course.external_id);
        if let Some(ref code) = course.code {
            println!("  code: {}", code);
        }
        if let Some(ref term) = course.term {
            println!("  term: {}", term);
        }
    }
    Ok(())
}

pub fn print_materials(materials: &[ExternalMaterial], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(materials);
    }
    if materials.is_empty() {
        println!("{} No materials found", style("!").yellow());
        return Ok(());
    }
    println!("\n{} ({})", style("Materials").bold(), materials.len());
    println!("{}", "-".repeat(80));
    for material in materials {
        println!(
            "{}  {}",
            style(clip(&material.title, 60)).bold(),
            style(&material.content_type).dim()
        );
        println!("  file: {}", material.filename);
        println!("  id:   {}", material.external_id);
    }
    Ok(())
}

pub fn print_enrollments(enrollments: &[ExternalEnrollment], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(enrollments);
    }
    println!("\n{} ({})", style("Enrollments").bold(), enrollments.len());
    println!("{}", "-".repeat(80));
    println!("{:<20} {:<30} {:<15} Email", "User", "Name", "Role");
    for e in enrollments {
        println!(
            "{:<20} {:<30} {:<15} {}",
            clip(&e.external_user_id, 20),
            clip(e.name.as_deref().unwrap_or("-"), 30),
            clip(&e.role, 15),
            e.email.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("Introducción a la física", 10), "Introducc…");
    }
}
