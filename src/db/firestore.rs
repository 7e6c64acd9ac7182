// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed [`Store`].
//!
//! One collection per entity. Document IDs are the natural keys, so
//! insert-once writes use create semantics and an existing document is
//! reported as "not inserted" instead of an error.

use crate::db::{collections, Store};
use crate::error::AppError;
use crate::models::{
    race_result_key, race_week_key, Car, CarClass, Club, Driver, RaceResult, RaceStats, RaceWeek,
    RaceWeekResult, Season, Series, TimeRanking, TimeTrialResult, Track,
};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Emulator connection with a dummy bearer token.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client; every operation fails with a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Helper Methods ──────────────────────────────────────────

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_doc<T>(&self, collection: &str, id: String, object: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create the document; `false` if it already exists.
    async fn create_doc<T>(&self, collection: &str, id: String, object: &T) -> Result<bool, AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        let result: Result<(), FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await;
        match result {
            Ok(()) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }
}

#[async_trait]
impl Store for FirestoreDb {
    async fn list_tracked_series(&self) -> Result<Vec<Series>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SERIES)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_series(&self, series: &Series) -> Result<(), AppError> {
        self.set_doc(collections::SERIES, series.series_id.to_string(), series)
            .await
    }

    async fn get_season(&self, season_id: i64) -> Result<Option<Season>, AppError> {
        self.get_doc(collections::SEASONS, &season_id.to_string())
            .await
    }

    async fn list_seasons_by_series(&self, series_id: i64) -> Result<Vec<Season>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SEASONS)
            .filter(move |q| q.field("series_id").eq(series_id))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_season(&self, season: &Season) -> Result<(), AppError> {
        self.set_doc(collections::SEASONS, season.season_id.to_string(), season)
            .await
    }

    async fn upsert_track(&self, track: &Track) -> Result<(), AppError> {
        self.set_doc(collections::TRACKS, track.track_id.to_string(), track)
            .await
    }

    async fn upsert_car(&self, car: &Car) -> Result<(), AppError> {
        self.set_doc(collections::CARS, car.car_id.to_string(), car)
            .await
    }

    async fn upsert_car_class(&self, car_class: &CarClass) -> Result<(), AppError> {
        self.set_doc(
            collections::CAR_CLASSES,
            car_class.car_class_id.to_string(),
            car_class,
        )
        .await
    }

    async fn get_car_class(&self, car_class_id: i64) -> Result<Option<CarClass>, AppError> {
        self.get_doc(collections::CAR_CLASSES, &car_class_id.to_string())
            .await
    }

    async fn upsert_club(&self, club: &Club) -> Result<(), AppError> {
        self.set_doc(collections::CLUBS, club.club_id.to_string(), club)
            .await
    }

    async fn upsert_driver(&self, driver: &Driver) -> Result<(), AppError> {
        self.set_doc(collections::DRIVERS, driver.driver_id.to_string(), driver)
            .await
    }

    async fn insert_race_week(&self, race_week: &RaceWeek) -> Result<RaceWeek, AppError> {
        if self
            .create_doc(collections::RACE_WEEKS, race_week.key(), race_week)
            .await?
        {
            return Ok(race_week.clone());
        }
        self.get_race_week(race_week.season_id, race_week.week)
            .await?
            .ok_or_else(|| AppError::Database(format!("race week {} vanished", race_week.key())))
    }

    async fn get_race_week(&self, season_id: i64, week: i64) -> Result<Option<RaceWeek>, AppError> {
        self.get_doc(collections::RACE_WEEKS, &race_week_key(season_id, week))
            .await
    }

    async fn upsert_race_week_result(&self, result: &RaceWeekResult) -> Result<(), AppError> {
        self.set_doc(
            collections::RACE_WEEK_RESULTS,
            result.subsession_id.to_string(),
            result,
        )
        .await
    }

    async fn get_race_stats(&self, subsession_id: i64) -> Result<Option<RaceStats>, AppError> {
        self.get_doc(collections::RACE_STATS, &subsession_id.to_string())
            .await
    }

    async fn insert_race_stats(&self, stats: &RaceStats, overwrite: bool) -> Result<bool, AppError> {
        let id = stats.subsession_id.to_string();
        if overwrite {
            self.set_doc(collections::RACE_STATS, id, stats).await?;
            return Ok(true);
        }
        self.create_doc(collections::RACE_STATS, id, stats).await
    }

    async fn insert_race_result(&self, result: &RaceResult) -> Result<bool, AppError> {
        self.create_doc(collections::RACE_RESULTS, result.key(), result)
            .await
    }

    async fn get_race_result(
        &self,
        subsession_id: i64,
        driver_id: i64,
    ) -> Result<Option<RaceResult>, AppError> {
        self.get_doc(
            collections::RACE_RESULTS,
            &race_result_key(subsession_id, driver_id),
        )
        .await
    }

    async fn upsert_time_ranking(&self, ranking: &TimeRanking) -> Result<(), AppError> {
        self.set_doc(collections::TIME_RANKINGS, ranking.key(), ranking)
            .await
    }

    async fn upsert_time_trial_result(&self, result: &TimeTrialResult) -> Result<(), AppError> {
        self.set_doc(collections::TIME_TRIAL_RESULTS, result.key(), result)
            .await
    }
}
