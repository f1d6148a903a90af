//! Field-by-field conversion of docrepo options into driver options.

use mongodb::{IndexModel as DriverIndexModel, options as driver};

use docrepo_core::{
    index::IndexModel,
    options::{
        AggregateOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReplaceOptions, ReturnDocument,
        UpdateOptions,
    },
};

pub(crate) fn find_options(options: FindOptions) -> driver::FindOptions {
    let mut converted = driver::FindOptions::default();
    converted.skip = options.skip;
    converted.limit = options.limit;
    converted.sort = options.sort;
    converted.projection = options.projection;
    converted
}

pub(crate) fn find_one_options(options: FindOneOptions) -> driver::FindOneOptions {
    let mut converted = driver::FindOneOptions::default();
    converted.skip = options.skip;
    converted.sort = options.sort;
    converted.projection = options.projection;
    converted
}

pub(crate) fn update_options(options: UpdateOptions) -> driver::UpdateOptions {
    let mut converted = driver::UpdateOptions::default();
    converted.upsert = options.upsert;
    converted
}

pub(crate) fn replace_options(options: ReplaceOptions) -> driver::ReplaceOptions {
    let mut converted = driver::ReplaceOptions::default();
    converted.upsert = options.upsert;
    converted
}

pub(crate) fn find_one_and_update_options(options: FindOneAndUpdateOptions) -> driver::FindOneAndUpdateOptions {
    let mut converted = driver::FindOneAndUpdateOptions::default();
    converted.upsert = options.upsert;
    converted.sort = options.sort;
    converted.projection = options.projection;
    converted.return_document = Some(match options.return_document {
        ReturnDocument::Before => driver::ReturnDocument::Before,
        ReturnDocument::After => driver::ReturnDocument::After,
    });
    converted
}

pub(crate) fn aggregate_options(options: AggregateOptions) -> driver::AggregateOptions {
    let mut converted = driver::AggregateOptions::default();
    converted.allow_disk_use = options.allow_disk_use;
    converted.batch_size = options.batch_size;
    converted
}

pub(crate) fn index_model(model: IndexModel) -> DriverIndexModel {
    let options = model.options.map(|options| {
        let mut converted = driver::IndexOptions::default();
        converted.name = options.name;
        converted.unique = options.unique;
        converted.sparse = options.sparse;
        converted.expire_after = options.expire_after;
        converted
    });

    DriverIndexModel::builder()
        .keys(model.keys)
        .options(options)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docrepo_core::index::IndexOptions;
    use std::time::Duration;

    #[test]
    fn index_model_keeps_keys_and_options() {
        let model = IndexModel::new(doc! { "email": 1, "created": -1 }).with_options(
            IndexOptions::default()
                .with_name("by_email")
                .with_unique(true)
                .with_expire_after(Duration::from_secs(60)),
        );

        let converted = index_model(model);

        assert_eq!(converted.keys, doc! { "email": 1, "created": -1 });
        let options = converted.options.unwrap();
        assert_eq!(options.name.as_deref(), Some("by_email"));
        assert_eq!(options.unique, Some(true));
        assert_eq!(options.expire_after, Some(Duration::from_secs(60)));
    }

    #[test]
    fn return_document_defaults_to_before() {
        let converted = find_one_and_update_options(FindOneAndUpdateOptions::default());

        assert!(matches!(converted.return_document, Some(driver::ReturnDocument::Before)));
        assert_eq!(converted.upsert, None);
    }

    #[test]
    fn find_options_copy_paging_fields() {
        let converted = find_options(FindOptions::default().with_skip(20).with_limit(10));

        assert_eq!(converted.skip, Some(20));
        assert_eq!(converted.limit, Some(10));
    }
}
