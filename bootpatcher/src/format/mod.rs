/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

pub mod android;
pub mod bootimage;
pub mod bump;
pub mod compression;
pub mod header;
pub mod loki;
pub mod mtk;
pub mod padding;
