// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reference entities refreshed opportunistically (tracks, cars, clubs,
//! drivers).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub track_id: i64,
    pub name: String,
    pub config: String,
    /// Lowercase (`road`, `oval`, `dirt_road`, ...)
    pub category: String,
    pub banner_image: String,
    pub panel_image: String,
    pub logo_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Car {
    pub car_id: i64,
    pub name: String,
    pub description: String,
    pub make: String,
    pub model: String,
    pub panel_image: String,
    pub logo_image: String,
    pub car_image: String,
}

/// A group of cars racing together in one class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarClass {
    pub car_class_id: i64,
    pub name: String,
    pub short_name: String,
    /// Car IDs belonging to this class
    pub cars_in_class: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Club {
    pub club_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Driver {
    pub driver_id: i64,
    pub name: String,
    pub club_id: i64,
}
