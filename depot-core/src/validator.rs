use crate::{CrudAction, Item};

/// When items are validated before a batch runs.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prevalidation {
    /// Items are not validated upfront.
    #[default]
    Off,
    /// Stop at the first item with errors.
    ToFirstFailure,
    /// Validate every item, collecting all the errors.
    Full,
}

/// Hooks run by the resolver around each item.
pub trait Validator: Send + Sync {
    fn prevalidation(&self) -> Prevalidation {
        Prevalidation::Off
    }

    /// Push the problems of `item` into `errors`.
    fn validate(&self, _item: &dyn Item, _action: CrudAction, _errors: &mut Vec<String>) {}

    /// Return `false` to skip the item, skipped items are not counted.
    fn performing(&self, _item: &dyn Item, _action: CrudAction) -> bool {
        true
    }

    fn performed(&self, _item: &dyn Item, _action: CrudAction) {}

    fn is_valid(&self, item: &dyn Item, action: CrudAction) -> Vec<String> {
        let mut errors = Vec::new();
        self.validate(item, action, &mut errors);
        errors
    }
}

/// Accepts everything.
#[derive(Default, Debug, Clone, Copy)]
pub struct AcceptAll;

impl Validator for AcceptAll {}
