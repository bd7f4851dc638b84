/// unwrap the result of a store lookup, failing with a not found error
/// when the entity does not exist
macro_rules! require_entity {
    ( $lookup:expr, $entity:expr, $id:expr, $target:expr ) => {
        match $lookup {
            Some(found) => found,
            None => {
                log::warn!(target: $target, "{} {} not found", $entity, $id);
                return $crate::errors::NotFoundSnafu {
                    entity: $entity,
                    id: $id.to_string(),
                }
                .fail();
            }
        }
    };
}

/// not found error for an entity id
macro_rules! not_found {
    ( $entity:expr, $id:expr ) => {
        $crate::errors::NotFoundSnafu {
            entity: $entity,
            id: $id.to_string(),
        }
        .fail()
    };
}

pub(crate) use not_found;
pub(crate) use require_entity;
