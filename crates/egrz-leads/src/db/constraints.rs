use crate::Result;
use futures::prelude::*;
use std::collections::HashSet;

macro_rules! def_constraints {
    ($($ident:ident)*) => {
        $(
            // The variable name will have the same casing convention as the constraint name.
            #[allow(non_upper_case_globals, dead_code)]
            pub(crate) const $ident: &str = stringify!($ident);
        )*
        const ALL_CONSTRAINTS: &[&str] = &[$($ident),*];
    }
}

def_constraints! {
    tg_users_pk
    allowed_usernames_pk
    subscriptions_pk
    lead_cache_pk
    delivery_facts_pk
}

pub(crate) async fn validate(pool: sqlx::PgPool) {
    Constraints::new(pool).validate().await
}

struct Constraints {
    pool: sqlx::PgPool,
}

impl Constraints {
    fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn validate(&self) {
        let actual_constraints = self
            .fetch_all()
            .await
            .expect("BUG: failed to fetch constraints for validation");

        let non_existing_constraints: Vec<_> = ALL_CONSTRAINTS
            .iter()
            .filter(|&&constraint| !actual_constraints.contains(constraint))
            .collect();

        assert_eq!(
            non_existing_constraints,
            &[] as &[&&str],
            "Some constraints were not defined in migrations. Actual constraints: {actual_constraints:?}",
        );
    }

    async fn fetch_all(&self) -> Result<HashSet<String>> {
        let query = sqlx::query_scalar::<_, String>(
            "
            select conname::text
            from pg_catalog.pg_constraint
            inner join pg_catalog.pg_namespace nsp
            on nsp.oid = connamespace and nsp.nspname = 'public'
            ",
        );

        query.fetch(&self.pool).try_collect().err_into().await
    }
}
