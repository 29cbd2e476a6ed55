//! Recurring templates and the engines that act on them.
//!
//! This module contains everything related to recurring transactions:
//! - The `RecurringTemplate` model and its database functions
//! - The occurrence generator, which materialises due occurrences as
//!   one-time transactions
//! - The retraction engine, which removes generated transactions again when
//!   a template's occurrence cap shrinks

mod core;
mod generator;
mod retraction;

pub use core::{
    OccurrenceCap, RecurringTemplate, RecurringTemplateBuilder, TemplateDeletion, TemplateUpdate,
    create_template, create_template_table, delete_template, get_account_templates, get_template,
    map_template_row, update_template,
};
pub use generator::{generate_due, generate_due_for_account, run_recurring_sweep};
pub use retraction::{needs_retraction, reconcile_after_edit};

pub(crate) use core::restore_template;
